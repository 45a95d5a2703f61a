// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for consuming and producing Rust syntax elements.

use proc_macro2::TokenStream;
use quote::quote;

/// Appends the compile error for `e` to `s`.
///
/// Keeping the input in the output avoids follow-up errors such as "trait not found" in the
/// code that uses it.
#[must_use]
#[expect(clippy::needless_pass_by_value, reason = "Convention for syn-based code")]
pub fn token_stream_and_error(s: TokenStream, e: syn::Error) -> TokenStream {
    let error = e.to_compile_error();

    quote! {
        #s
        #error
    }
}

/// Whether `tokens` contain a compile error. Used by macro unit tests.
#[cfg(test)]
#[must_use]
pub fn contains_compile_error(tokens: &TokenStream) -> bool {
    tokens.to_string().contains(":: core :: compile_error ! {")
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use proc_macro2::Span;

    use super::*;

    #[test]
    fn token_stream_and_error_outputs_both() {
        let canary = "client-error-canary";
        let s = quote! {
            trait KeepMe {}
        };

        let merged = token_stream_and_error(s, syn::Error::new(Span::call_site(), canary)).to_string();

        assert!(merged.contains(canary));
        assert!(merged.contains("KeepMe"));
    }

    #[test]
    fn contains_compile_error_detects_generated_error() {
        let tokens = token_stream_and_error(TokenStream::new(), syn::Error::new(Span::call_site(), "Testing"));

        assert!(contains_compile_error(&tokens));
        assert!(!contains_compile_error(&quote!(let x = 1;)));
    }
}
