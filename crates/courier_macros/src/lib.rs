// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc(hidden)]

//! Macros for the [`courier`](https://docs.rs/courier) crate.

use proc_macro::TokenStream;

#[cfg_attr(test, mutants::skip)] // The macro is tested indirectly through the `courier` crate's tests, so we can skip it in mutation testing here.
#[proc_macro_attribute]
pub fn client(attr: TokenStream, item: TokenStream) -> TokenStream {
    courier_macros_impl::client::entrypoint(attr.into(), item.into()).into()
}
