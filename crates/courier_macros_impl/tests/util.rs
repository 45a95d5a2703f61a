// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use proc_macro2::TokenStream;
use quote::quote;
use syn::ItemTrait;

/// Expands `#[client]` on `item` and pretty-prints the result.
pub fn expand(item: &ItemTrait) -> String {
    let output = courier_macros_impl::client::entrypoint(TokenStream::new(), quote!(#item));
    prettyplease::unparse(&syn::parse2(output).unwrap())
}

/// Expands `#[client]` on `item`, returning the raw tokens.
pub fn expand_raw(item: &ItemTrait) -> String {
    courier_macros_impl::client::entrypoint(TokenStream::new(), quote!(#item)).to_string()
}

pub fn contains_compile_error(output: &str) -> bool {
    output.contains(":: core :: compile_error ! {")
}

/// Removes all whitespace and trailing commas so assertions do not depend on formatting.
///
/// `prettyplease` adds a trailing comma to argument lists it wraps over several lines.
pub fn squash(text: &str) -> String {
    let squashed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    squashed.replace(",)", ")").replace(",]", "]").replace(",}", "}")
}

pub fn assert_contains(output: &str, fragment: &str) {
    assert!(
        squash(output).contains(&squash(fragment)),
        "expected the expansion to contain `{fragment}`, got:\n{output}"
    );
}
