// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{Attribute, FnArg, LitStr, Meta, Pat, PatType};

const PARAMETER_ATTRIBUTES: [&str; 5] = ["payload", "path_param", "query", "header", "headers"];

/// What a method parameter contributes to the call description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Payload,
    PathParam(String),
    Query(String),
    Header(String),
    Headers,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub ident: Ident,
    pub role: Role,
}

impl Parameter {
    /// The builder call adding this parameter to a `CallDescriptionBuilder`.
    pub fn builder_call(&self) -> TokenStream {
        let ident = &self.ident;
        match &self.role {
            Role::Payload => quote!(.payload(&#ident)),
            Role::PathParam(name) => quote!(.path_param(#name, ::std::string::ToString::to_string(&#ident))),
            Role::Query(name) => quote!(.query_param(#name, ::std::string::ToString::to_string(&#ident))),
            Role::Header(name) => quote!(.header(#name, ::std::string::ToString::to_string(&#ident))),
            Role::Headers => quote!(.headers(#ident)),
        }
    }
}

pub fn is_parameter_attribute(attr: &Attribute) -> bool {
    PARAMETER_ATTRIBUTES.iter().any(|name| attr.path().is_ident(name))
}

/// Reads the marked parameters of a call method, skipping the receiver.
///
/// Every parameter must carry exactly one marker, and at most one may be the payload.
pub fn parse_parameters<'a>(inputs: impl IntoIterator<Item = &'a FnArg>) -> syn::Result<Vec<Parameter>> {
    let mut parameters: Vec<Parameter> = Vec::new();

    for input in inputs {
        let FnArg::Typed(typed) = input else {
            continue;
        };

        let parameter = parse_parameter(typed)?;
        if parameter.role == Role::Payload && parameters.iter().any(|p| p.role == Role::Payload) {
            return Err(syn::Error::new_spanned(typed, "a method can have at most one `#[payload]` parameter"));
        }

        parameters.push(parameter);
    }

    Ok(parameters)
}

fn parse_parameter(typed: &PatType) -> syn::Result<Parameter> {
    let Pat::Ident(pat) = typed.pat.as_ref() else {
        return Err(syn::Error::new_spanned(&typed.pat, "call parameters must be plain identifiers"));
    };

    let mut markers = typed.attrs.iter().filter(|attr| is_parameter_attribute(attr));
    let Some(marker) = markers.next() else {
        return Err(syn::Error::new_spanned(
            typed,
            "call parameters must be marked with `#[payload]`, `#[path_param]`, `#[query]`, `#[header]` or `#[headers]`",
        ));
    };

    if let Some(extra) = markers.next() {
        return Err(syn::Error::new_spanned(extra, "a parameter can carry only one marker"));
    }

    Ok(Parameter {
        ident: pat.ident.clone(),
        role: parse_role(marker)?,
    })
}

fn parse_role(attr: &Attribute) -> syn::Result<Role> {
    if attr.path().is_ident("payload") || attr.path().is_ident("headers") {
        let Meta::Path(_) = &attr.meta else {
            return Err(syn::Error::new_spanned(attr, "this marker takes no arguments"));
        };
        return Ok(if attr.path().is_ident("payload") { Role::Payload } else { Role::Headers });
    }

    let name: LitStr = attr.parse_args()?;
    if name.value().is_empty() {
        return Err(syn::Error::new_spanned(name, "the name must not be empty"));
    }

    if attr.path().is_ident("path_param") {
        Ok(Role::PathParam(name.value()))
    } else if attr.path().is_ident("query") {
        Ok(Role::Query(name.value()))
    } else {
        Ok(Role::Header(name.value()))
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use syn::{Signature, parse_quote};

    use super::*;

    fn parse(signature: &Signature) -> syn::Result<Vec<Parameter>> {
        parse_parameters(&signature.inputs)
    }

    #[test]
    fn reads_every_role() {
        let signature: Signature = parse_quote! {
            fn update(
                &self,
                #[path_param("id")] id: u64,
                #[query("dry_run")] dry_run: bool,
                #[header("X-Request-Id")] request_id: &str,
                #[headers] extra: HashMap<String, String>,
                #[payload] user: &User
            ) -> Single<User>
        };

        let roles: Vec<_> = parse(&signature).unwrap().into_iter().map(|p| p.role).collect();

        assert_eq!(
            roles,
            [
                Role::PathParam("id".to_owned()),
                Role::Query("dry_run".to_owned()),
                Role::Header("X-Request-Id".to_owned()),
                Role::Headers,
                Role::Payload,
            ]
        );
    }

    #[test]
    fn builder_calls_stringify_values() {
        let signature: Signature = parse_quote!(fn get(&self, #[path_param("id")] id: u64) -> Single<User>);

        let parameter = &parse(&signature).unwrap()[0];

        assert_eq!(
            parameter.builder_call().to_string(),
            quote!(.path_param("id", ::std::string::ToString::to_string(&id))).to_string()
        );
    }

    #[test]
    fn rejects_second_payload() {
        let signature: Signature = parse_quote!(fn post(&self, #[payload] a: A, #[payload] b: B) -> Single<User>);

        parse(&signature).unwrap_err();
    }

    #[test]
    fn rejects_unmarked_parameter() {
        let signature: Signature = parse_quote!(fn get(&self, id: u64) -> Single<User>);

        parse(&signature).unwrap_err();
    }

    #[test]
    fn rejects_two_markers() {
        let signature: Signature = parse_quote!(fn get(&self, #[query("a")] #[header("b")] id: u64) -> Single<User>);

        parse(&signature).unwrap_err();
    }

    #[test]
    fn rejects_destructuring() {
        let signature: Signature = parse_quote!(fn get(&self, #[payload] (a, b): (u32, u32)) -> Single<User>);

        parse(&signature).unwrap_err();
    }

    #[test]
    fn rejects_missing_or_empty_name() {
        let missing: Signature = parse_quote!(fn get(&self, #[query] id: u64) -> Single<User>);
        let empty: Signature = parse_quote!(fn get(&self, #[header("")] id: u64) -> Single<User>);
        let payload_args: Signature = parse_quote!(fn get(&self, #[payload("x")] id: u64) -> Single<User>);

        parse(&missing).unwrap_err();
        parse(&empty).unwrap_err();
        parse(&payload_args).unwrap_err();
    }
}
