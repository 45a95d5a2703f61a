// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Picks the dispatch paradigm of a method from its return type and protocol.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{GenericArgument, PathArguments, PathSegment, Type};

use crate::metadata::Protocol;

/// How a generated method dispatches its call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paradigm {
    ReactiveSingle,
    ReactiveMulti,
    Blocking,
    BlockingAsync,
    RpcBlocking,
    RpcFuture,
}

/// Classifies a method returning `output` over `protocol`.
///
/// Wrappers are recognized by the last segment of the return type path, so `Single<T>` and
/// `courier::Single<T>` are equivalent. Every input maps to a paradigm; a return type that
/// does not fit the paradigm is reported later by [`response_type`].
#[must_use]
pub fn classify(output: &Type, protocol: Protocol) -> Paradigm {
    let wrapper = last_segment(output).map(|segment| segment.ident.to_string());

    match (protocol, wrapper.as_deref()) {
        (Protocol::Http, Some("Single")) => Paradigm::ReactiveSingle,
        (Protocol::Http, Some("Multi")) => Paradigm::ReactiveMulti,
        (Protocol::Http, Some("Pending")) => Paradigm::BlockingAsync,
        (Protocol::Http, _) => Paradigm::Blocking,
        (Protocol::Rpc, Some("Pending")) => Paradigm::RpcFuture,
        (Protocol::Rpc, _) => Paradigm::RpcBlocking,
    }
}

/// Extracts the type a response body decodes into.
///
/// # Errors
///
/// Fails if `output` does not have the shape `paradigm` expects: `Single<T>`, `Multi<T>` or
/// `Pending<T>` for the asynchronous paradigms and `Result<Option<T>>` for the blocking ones.
pub fn response_type(output: &Type, paradigm: Paradigm) -> syn::Result<&Type> {
    match paradigm {
        Paradigm::ReactiveSingle | Paradigm::ReactiveMulti | Paradigm::BlockingAsync | Paradigm::RpcFuture => {
            last_segment(output).and_then(single_type_argument).ok_or_else(|| {
                syn::Error::new_spanned(output, "expected a wrapper with exactly one type argument, such as `Single<T>`")
            })
        }
        Paradigm::Blocking | Paradigm::RpcBlocking => last_segment(output)
            .filter(|segment| segment.ident == "Result")
            .and_then(first_type_argument)
            .and_then(last_segment)
            .filter(|segment| segment.ident == "Option")
            .and_then(single_type_argument)
            .ok_or_else(|| syn::Error::new_spanned(output, "expected `Result<Option<T>>` for a blocking call")),
    }
}

/// Builds the `courier::ResponseType` expression describing `ty`, keeping its type arguments.
#[must_use]
pub fn response_type_descriptor(ty: &Type) -> TokenStream {
    let Some(segment) = last_segment(ty) else {
        let name = ty.to_token_stream().to_string().replace(' ', "");
        return quote!(::courier::ResponseType::new(#name));
    };

    let name = segment.ident.to_string();
    let args = type_arguments(segment).map(response_type_descriptor);

    quote!(::courier::ResponseType::new(#name)#(.with_arg(#args))*)
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    match ty {
        Type::Path(path) => path.path.segments.last(),
        Type::Group(group) => last_segment(&group.elem),
        Type::Paren(paren) => last_segment(&paren.elem),
        _ => None,
    }
}

fn type_arguments(segment: &PathSegment) -> impl Iterator<Item = &Type> {
    let args = match &segment.arguments {
        PathArguments::AngleBracketed(args) => Some(args.args.iter()),
        _ => None,
    };

    args.into_iter().flatten().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn first_type_argument(segment: &PathSegment) -> Option<&Type> {
    type_arguments(segment).next()
}

fn single_type_argument(segment: &PathSegment) -> Option<&Type> {
    let mut args = type_arguments(segment);
    let first = args.next()?;
    args.next().is_none().then_some(first)
}
