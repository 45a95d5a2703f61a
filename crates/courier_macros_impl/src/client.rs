// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `#[client]` attribute.

use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::ItemTrait;

use crate::syn_helpers::token_stream_and_error;
use crate::synth::{strip_attributes, synthesize};

/// Expands `#[client]` on the trait in `input`.
///
/// On failure the trait is still emitted, without its call attributes, next to the error.
#[must_use]
pub fn entrypoint(attr: TokenStream, input: TokenStream) -> TokenStream {
    match core(attr, input.clone()) {
        Ok(result) => result,
        Err(e) => token_stream_and_error(stripped(input), e),
    }
}

fn core(attr: TokenStream, input: TokenStream) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new_spanned(attr, "`client` takes no arguments"));
    }

    let item = syn::parse2::<ItemTrait>(input)?;
    synthesize(item)
}

fn stripped(input: TokenStream) -> TokenStream {
    match syn::parse2::<ItemTrait>(input.clone()) {
        Ok(mut item) => {
            strip_attributes(&mut item);
            item.into_token_stream()
        }
        Err(_) => input,
    }
}
