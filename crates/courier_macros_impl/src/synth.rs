// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Generates the client struct and trait implementation for a `#[client]` trait.

use std::collections::{BTreeSet, HashSet};

use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote};
use syn::{Attribute, FnArg, ItemTrait, ReturnType, Signature, TraitItem, TraitItemFn, Type};

use crate::classify::{Paradigm, classify, response_type, response_type_descriptor};
use crate::metadata::{CallMetadata, is_call_attribute};
use crate::params::{Parameter, is_parameter_attribute, parse_parameters};

/// A trait method that maps to a call.
struct CallMethod {
    signature: Signature,
    metadata: CallMetadata,
    paradigm: Paradigm,
    output: Type,
    response: Type,
    parameters: Vec<Parameter>,
}

/// Generates the code for `item`.
///
/// The emitted trait has every call and parameter attribute removed.
pub fn synthesize(mut item: ItemTrait) -> syn::Result<TokenStream> {
    if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
        return Err(syn::Error::new_spanned(&item.generics, "generic client traits are not supported"));
    }

    if !item.supertraits.is_empty() {
        return Err(syn::Error::new_spanned(&item.supertraits, "client traits cannot have supertraits"));
    }

    let method_names: HashSet<String> = item
        .items
        .iter()
        .filter_map(|entry| match entry {
            TraitItem::Fn(method) => Some(method.sig.ident.to_string()),
            _ => None,
        })
        .collect();

    let mut calls = Vec::new();
    for entry in &item.items {
        let TraitItem::Fn(method) = entry else {
            return Err(syn::Error::new_spanned(entry, "client traits can only contain methods"));
        };

        if let Some(call) = call_method(method, &method_names)? {
            calls.push(call);
        }
    }

    strip_attributes(&mut item);

    let trait_ident = &item.ident;
    let vis = &item.vis;
    let client_ident = format_ident!("{}Client", trait_ident);
    let client_name = client_ident.to_string();
    let struct_doc = format!("Generated implementation of [`{trait_ident}`].");
    let checks = startup_checks(&calls);
    let methods = calls.iter().map(|call| method_body(call, trait_ident));

    Ok(quote! {
        #item

        #[doc = #struct_doc]
        #vis struct #client_ident<B = ::courier::StandardBackend> {
            context: ::courier::Context<B>,
        }

        impl<B: ::courier::ResilienceBackend> #client_ident<B> {
            /// Creates a client over `context`.
            ///
            /// # Errors
            ///
            /// Returns a configuration error if a service this client calls has no registered
            /// transport client, or an RPC client lacks a binding for one of the declared methods.
            #vis fn new(context: ::courier::Context<B>) -> ::courier::Result<Self> {
                #(#checks)*
                ::core::result::Result::Ok(Self { context })
            }

            /// The context this client dispatches through.
            #vis fn context(&self) -> &::courier::Context<B> {
                &self.context
            }
        }

        impl<B> ::core::clone::Clone for #client_ident<B> {
            fn clone(&self) -> Self {
                Self {
                    context: ::core::clone::Clone::clone(&self.context),
                }
            }
        }

        impl<B: ::core::fmt::Debug> ::core::fmt::Debug for #client_ident<B> {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.debug_struct(#client_name).field("context", &self.context).finish()
            }
        }

        impl<B: ::courier::ResilienceBackend> #trait_ident for #client_ident<B> {
            #(#methods)*
        }
    })
}

/// Removes every call and parameter attribute from `item`.
pub fn strip_attributes(item: &mut ItemTrait) {
    for entry in &mut item.items {
        if let TraitItem::Fn(method) = entry {
            method.attrs.retain(|attr| !is_call_attribute(attr));
            for input in &mut method.sig.inputs {
                if let FnArg::Typed(typed) = input {
                    typed.attrs.retain(|attr| !is_parameter_attribute(attr));
                }
            }
        }
    }
}

fn call_method(method: &TraitItemFn, method_names: &HashSet<String>) -> syn::Result<Option<CallMethod>> {
    let Some((metadata, attr)) = CallMetadata::find(&method.attrs)? else {
        if method.default.is_some() {
            return Ok(None);
        }
        return Err(syn::Error::new_spanned(&method.sig.ident, "Unrecognized call annotation"));
    };

    if method.default.is_some() {
        return Err(syn::Error::new_spanned(&method.sig.ident, "call methods cannot have a default body"));
    }

    check_signature(&method.sig)?;
    check_fallback(&metadata, attr, method_names)?;

    let ReturnType::Type(_, output) = &method.sig.output else {
        return Err(syn::Error::new_spanned(&method.sig, "call methods must declare a return type"));
    };

    let paradigm = classify(output, metadata.protocol());
    let response = response_type(output, paradigm)?.clone();
    let parameters = parse_parameters(&method.sig.inputs)?;

    let mut signature = method.sig.clone();
    for input in &mut signature.inputs {
        if let FnArg::Typed(typed) = input {
            typed.attrs.clear();
        }
    }

    Ok(Some(CallMethod {
        signature,
        metadata,
        paradigm,
        output: output.as_ref().clone(),
        response,
        parameters,
    }))
}

fn check_signature(signature: &Signature) -> syn::Result<()> {
    if let Some(asyncness) = &signature.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "async call methods are not supported; return `Single`, `Multi` or `Pending` instead",
        ));
    }

    if !signature.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&signature.generics, "generic call methods are not supported"));
    }

    match signature.inputs.first() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => Ok(()),
        _ => Err(syn::Error::new_spanned(&signature.ident, "call methods must take `&self`")),
    }
}

fn check_fallback(metadata: &CallMetadata, attr: &Attribute, method_names: &HashSet<String>) -> syn::Result<()> {
    match metadata.fallback() {
        Some(name) if !method_names.contains(name) => Err(syn::Error::new_spanned(
            attr,
            format!("unknown fallback `{name}`: the trait has no method with that name"),
        )),
        _ => Ok(()),
    }
}

fn startup_checks(calls: &[CallMethod]) -> Vec<TokenStream> {
    let mut reactive = BTreeSet::new();
    let mut blocking = BTreeSet::new();
    let mut checks = Vec::new();

    for call in calls {
        match (&call.metadata, call.paradigm) {
            (CallMetadata::Rpc(rpc), _) => {
                let service = &rpc.common.service;
                let (package, class, method) = (&rpc.package, &rpc.class, &rpc.method_name);
                checks.push(quote! {
                    ::courier::__private::require_rpc(
                        context.rpc_clients(),
                        #service,
                        &::courier::RpcPath::new(#package, #class, #method),
                    )?;
                });
            }
            (_, Paradigm::ReactiveSingle | Paradigm::ReactiveMulti) => {
                reactive.insert(call.metadata.service());
            }
            _ => {
                blocking.insert(call.metadata.service());
            }
        }
    }

    if !reactive.is_empty() {
        checks.insert(0, quote!(context.reactive_clients().require([#(#reactive),*])?;));
    }

    if !blocking.is_empty() {
        checks.insert(0, quote!(context.blocking_clients().require([#(#blocking),*])?;));
    }

    checks
}

fn method_body(call: &CallMethod, trait_ident: &Ident) -> TokenStream {
    let CallMethod {
        signature,
        metadata,
        paradigm,
        output,
        response,
        parameters,
    } = call;

    let service = metadata.service();
    let target = match metadata {
        CallMetadata::Http(http) => {
            let verb = http.verb.variant();
            let path = metadata.path();
            quote!(.http(::courier::HttpMethod::#verb, #path))
        }
        CallMetadata::Rpc(rpc) => {
            let kind = rpc.kind.variant();
            let (package, class, method) = (&rpc.package, &rpc.class, &rpc.method_name);
            quote!(.rpc(::courier::RpcPath::new(#package, #class, #method), ::courier::RpcMethod::#kind))
        }
    };
    let descriptor = response_type_descriptor(response);
    let parameters = parameters.iter().map(Parameter::builder_call);
    let silent = metadata.is_silent();
    let retryable = metadata.is_retryable();
    let cb_enabled = metadata.circuit_breaker_enabled();
    let cb_tag = metadata.circuit_breaker();
    let bh_enabled = metadata.bulkhead_enabled();
    let bh_tag = metadata.bulkhead();
    let retry_tag = metadata.retry();
    let fallback_name = metadata.fallback().map(|name| quote!(.fallback(#name)));

    let fallback = match metadata.fallback() {
        Some(name) => {
            let fallback_ident = format_ident!("{}", name);
            quote! {
                ::core::option::Option::Some(::courier::Fallback::new({
                    let this = ::core::clone::Clone::clone(self);
                    move |payload, headers| <Self as #trait_ident>::#fallback_ident(&this, payload, headers)
                }))
            }
        }
        None => quote!(::core::option::Option::None),
    };

    let (registry, executor) = match paradigm {
        Paradigm::ReactiveSingle => (quote!(reactive_clients), quote!(reactive().execute_single)),
        Paradigm::ReactiveMulti => (quote!(reactive_clients), quote!(reactive().execute_multi)),
        Paradigm::Blocking => (quote!(blocking_clients), quote!(blocking().execute)),
        Paradigm::BlockingAsync => (quote!(blocking_clients), quote!(blocking().execute_async)),
        Paradigm::RpcBlocking => (quote!(rpc_clients), quote!(rpc().execute)),
        Paradigm::RpcFuture => (quote!(rpc_clients), quote!(rpc().execute_future)),
    };

    quote! {
        #signature {
            let description = ::courier::CallDescription::builder()
                .service(#service)
                #target
                .response_type(#descriptor)
                #(#parameters)*
                .silent(#silent)
                .retryable(#retryable)
                .circuit_breaker(#cb_enabled, #cb_tag)
                .bulkhead(#bh_enabled, #bh_tag)
                .retry_tag(#retry_tag)
                #fallback_name
                .build();
            let description = match description {
                ::core::result::Result::Ok(description) => description,
                ::core::result::Result::Err(error) => {
                    return <#output as ::courier::__private::FromFailure>::from_failure(error);
                }
            };
            let client = match self.context.#registry().client(description.service()) {
                ::core::result::Result::Ok(client) => client,
                ::core::result::Result::Err(error) => {
                    return <#output as ::courier::__private::FromFailure>::from_failure(error);
                }
            };
            let fallback = #fallback;
            self.context.#executor::<#response>(client, description, fallback)
        }
    }
}
