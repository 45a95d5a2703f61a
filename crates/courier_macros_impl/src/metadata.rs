// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Unifies the call attributes a method may carry into one [`CallMetadata`] value.

use darling::FromMeta;
use proc_macro2::{Ident, Span};
use syn::{Attribute, Meta};

/// Attributes declaring an HTTP call.
pub const HTTP_ATTRIBUTES: [&str; 7] = ["get", "post", "put", "delete", "patch", "options", "call"];

/// Attributes declaring an RPC call.
pub const RPC_ATTRIBUTES: [&str; 4] = ["unary_rpc", "server_stream_rpc", "client_stream_rpc", "bidi_rpc"];

/// Returns whether `attr` is one of the call attributes.
#[must_use]
pub fn is_call_attribute(attr: &Attribute) -> bool {
    HTTP_ATTRIBUTES
        .iter()
        .chain(RPC_ATTRIBUTES.iter())
        .any(|name| attr.path().is_ident(name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Rpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl HttpVerb {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    /// The matching `courier::HttpMethod` variant.
    #[must_use]
    pub fn variant(self) -> Ident {
        let name = match self {
            Self::Get => "Get",
            Self::Post => "Post",
            Self::Put => "Put",
            Self::Delete => "Delete",
            Self::Patch => "Patch",
            Self::Options => "Options",
        };
        Ident::new(name, Span::call_site())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcKind {
    Unary,
    ServerStreaming,
    ClientStreaming,
    BidiStreaming,
}

impl RpcKind {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "UNARY" => Some(Self::Unary),
            "SERVER_STREAMING" => Some(Self::ServerStreaming),
            "CLIENT_STREAMING" => Some(Self::ClientStreaming),
            "BIDI_STREAMING" => Some(Self::BidiStreaming),
            _ => None,
        }
    }

    fn for_attribute(attribute: &str) -> Self {
        match attribute {
            "server_stream_rpc" => Self::ServerStreaming,
            "client_stream_rpc" => Self::ClientStreaming,
            "bidi_rpc" => Self::BidiStreaming,
            _ => Self::Unary,
        }
    }

    /// The matching `courier::RpcMethod` variant.
    #[must_use]
    pub fn variant(self) -> Ident {
        let name = match self {
            Self::Unary => "Unary",
            Self::ServerStreaming => "ServerStreaming",
            Self::ClientStreaming => "ClientStreaming",
            Self::BidiStreaming => "BidiStreaming",
        };
        Ident::new(name, Span::call_site())
    }
}

#[derive(Debug, Default, FromMeta)]
struct HttpArgs {
    #[darling(default)]
    path: String,
    #[darling(default)]
    service: String,
    silent: Option<bool>,
    #[darling(default)]
    retryable: bool,
    #[darling(default)]
    cb_enabled: bool,
    #[darling(default)]
    bh_enabled: bool,
    #[darling(default)]
    circuit_breaker: String,
    #[darling(default)]
    bulkhead: String,
    #[darling(default)]
    retry: String,
    #[darling(default)]
    fallback: String,
    /// Only accepted by `#[call]`.
    method: Option<String>,
}

#[derive(Debug, Default, FromMeta)]
struct RpcArgs {
    #[darling(default)]
    path: String,
    #[darling(default)]
    service: String,
    #[darling(default)]
    package: String,
    #[darling(default)]
    class: String,
    #[darling(default)]
    method_name: String,
    method: Option<String>,
    silent: Option<bool>,
    #[darling(default)]
    retryable: bool,
    #[darling(default)]
    cb_enabled: bool,
    #[darling(default)]
    bh_enabled: bool,
    #[darling(default)]
    circuit_breaker: String,
    #[darling(default)]
    bulkhead: String,
    #[darling(default)]
    retry: String,
    #[darling(default)]
    fallback: String,
}

/// Fields shared by every call attribute.
///
/// Policy tags left empty resolve to the service name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonArgs {
    pub path: String,
    pub service: String,
    pub silent: bool,
    pub retryable: bool,
    pub cb_enabled: bool,
    pub bh_enabled: bool,
    circuit_breaker: String,
    bulkhead: String,
    retry: String,
    fallback: String,
}

impl CommonArgs {
    pub fn circuit_breaker(&self) -> &str {
        self.tag_or_service(&self.circuit_breaker)
    }

    pub fn bulkhead(&self) -> &str {
        self.tag_or_service(&self.bulkhead)
    }

    pub fn retry(&self) -> &str {
        self.tag_or_service(&self.retry)
    }

    /// The fallback method, if any. Unlike tags, an empty fallback stays empty.
    pub fn fallback(&self) -> Option<&str> {
        (!self.fallback.is_empty()).then_some(self.fallback.as_str())
    }

    fn tag_or_service<'a>(&'a self, tag: &'a str) -> &'a str {
        if tag.is_empty() { &self.service } else { tag }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCall {
    pub verb: HttpVerb,
    pub common: CommonArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcCall {
    pub kind: RpcKind,
    pub package: String,
    pub class: String,
    pub method_name: String,
    pub common: CommonArgs,
}

/// The call attribute of one method, whichever shape it was written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallMetadata {
    Http(HttpCall),
    Rpc(RpcCall),
}

impl CallMetadata {
    /// Finds and parses the call attribute among `attrs`.
    ///
    /// Returns `Ok(None)` when there is none.
    ///
    /// # Errors
    ///
    /// Fails when more than one call attribute is present or the attribute is malformed.
    pub fn find(attrs: &[Attribute]) -> syn::Result<Option<(Self, &Attribute)>> {
        let mut calls = attrs.iter().filter(|attr| is_call_attribute(attr));
        let Some(first) = calls.next() else {
            return Ok(None);
        };

        if let Some(second) = calls.next() {
            return Err(syn::Error::new_spanned(second, "a method can carry only one call attribute"));
        }

        Ok(Some((Self::parse(first)?, first)))
    }

    /// Parses a single call attribute.
    ///
    /// # Errors
    ///
    /// Fails with "Unrecognized call annotation" if `attr` is not a call attribute, or with
    /// the argument error if its arguments do not parse.
    pub fn parse(attr: &Attribute) -> syn::Result<Self> {
        let Some(name) = attr.path().get_ident().map(ToString::to_string) else {
            return Err(syn::Error::new_spanned(attr, "Unrecognized call annotation"));
        };

        if HTTP_ATTRIBUTES.contains(&name.as_str()) {
            let args: HttpArgs = parse_args(attr)?;
            Ok(Self::Http(http_call(&name, args, attr)?))
        } else if RPC_ATTRIBUTES.contains(&name.as_str()) {
            let args: RpcArgs = parse_args(attr)?;
            Ok(Self::Rpc(rpc_call(&name, args, attr)?))
        } else {
            Err(syn::Error::new_spanned(attr, "Unrecognized call annotation"))
        }
    }

    pub fn common(&self) -> &CommonArgs {
        match self {
            Self::Http(call) => &call.common,
            Self::Rpc(call) => &call.common,
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http(_) => Protocol::Http,
            Self::Rpc(_) => Protocol::Rpc,
        }
    }

    pub fn path(&self) -> &str {
        &self.common().path
    }

    pub fn service(&self) -> &str {
        &self.common().service
    }

    pub fn is_silent(&self) -> bool {
        self.common().silent
    }

    pub fn is_retryable(&self) -> bool {
        self.common().retryable
    }

    pub fn circuit_breaker_enabled(&self) -> bool {
        self.common().cb_enabled
    }

    pub fn bulkhead_enabled(&self) -> bool {
        self.common().bh_enabled
    }

    pub fn circuit_breaker(&self) -> &str {
        self.common().circuit_breaker()
    }

    pub fn bulkhead(&self) -> &str {
        self.common().bulkhead()
    }

    pub fn retry(&self) -> &str {
        self.common().retry()
    }

    pub fn fallback(&self) -> Option<&str> {
        self.common().fallback()
    }
}

fn parse_args<T: FromMeta>(attr: &Attribute) -> syn::Result<T> {
    let parsed = match &attr.meta {
        Meta::Path(_) => T::from_list(&[]),
        meta => T::from_meta(meta),
    };
    parsed.map_err(|error| syn::Error::new_spanned(attr, error.to_string()))
}

fn http_call(name: &str, args: HttpArgs, attr: &Attribute) -> syn::Result<HttpCall> {
    let verb = match (name, args.method.as_deref()) {
        ("call", None) => HttpVerb::Post,
        ("call", Some(method)) => HttpVerb::parse(method)
            .ok_or_else(|| syn::Error::new_spanned(attr, format!("unsupported HTTP method `{method}`")))?,
        (_, Some(_)) => return Err(syn::Error::new_spanned(attr, "`method` is only accepted by `#[call]`")),
        (verb, None) => HttpVerb::parse(verb).ok_or_else(|| syn::Error::new_spanned(attr, "Unrecognized call annotation"))?,
    };

    Ok(HttpCall {
        verb,
        common: CommonArgs {
            path: args.path,
            service: args.service,
            silent: args.silent.unwrap_or(true),
            retryable: args.retryable,
            cb_enabled: args.cb_enabled,
            bh_enabled: args.bh_enabled,
            circuit_breaker: args.circuit_breaker,
            bulkhead: args.bulkhead,
            retry: args.retry,
            fallback: args.fallback,
        },
    })
}

fn rpc_call(name: &str, args: RpcArgs, attr: &Attribute) -> syn::Result<RpcCall> {
    let kind = match args.method.as_deref() {
        None => RpcKind::for_attribute(name),
        Some(method) => RpcKind::parse(method)
            .ok_or_else(|| syn::Error::new_spanned(attr, format!("unsupported RPC method `{method}`")))?,
    };

    Ok(RpcCall {
        kind,
        package: args.package,
        class: args.class,
        method_name: args.method_name,
        common: CommonArgs {
            path: args.path,
            service: args.service,
            silent: args.silent.unwrap_or(true),
            retryable: args.retryable,
            cb_enabled: args.cb_enabled,
            bh_enabled: args.bh_enabled,
            circuit_breaker: args.circuit_breaker,
            bulkhead: args.bulkhead,
            retry: args.retry,
            fallback: args.fallback,
        },
    })
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;
    use syn::parse_quote;

    use super::*;

    #[test]
    fn tags_default_to_service() {
        let attr: Attribute = parse_quote!(#[get(path = "/users", service = "svc-A")]);

        let metadata = CallMetadata::parse(&attr).unwrap();

        assert_eq!(metadata.circuit_breaker(), "svc-A");
        assert_eq!(metadata.bulkhead(), "svc-A");
        assert_eq!(metadata.retry(), "svc-A");
        assert_eq!(metadata.fallback(), None);
    }

    #[test]
    fn explicit_tags_win() {
        let attr: Attribute = parse_quote!(#[unary_rpc(
            service = "svc-A",
            circuit_breaker = "cb",
            bulkhead = "bh",
            retry = "rt",
            fallback = "cached"
        )]);

        let metadata = CallMetadata::parse(&attr).unwrap();

        assert_eq!(metadata.circuit_breaker(), "cb");
        assert_eq!(metadata.bulkhead(), "bh");
        assert_eq!(metadata.retry(), "rt");
        assert_eq!(metadata.fallback(), Some("cached"));
    }

    #[test]
    fn defaults_follow_annotation_schema() {
        let attr: Attribute = parse_quote!(#[post]);

        let metadata = CallMetadata::parse(&attr).unwrap();

        assert_eq!(metadata.path(), "");
        assert_eq!(metadata.service(), "");
        assert!(metadata.is_silent());
        assert!(!metadata.is_retryable());
        assert!(!metadata.circuit_breaker_enabled());
        assert!(!metadata.bulkhead_enabled());
        assert_eq!(metadata.protocol(), Protocol::Http);
    }

    #[test]
    fn flags_parse() {
        let attr: Attribute = parse_quote!(#[put(service = "s", silent = false, retryable, cb_enabled = true, bh_enabled = true)]);

        let metadata = CallMetadata::parse(&attr).unwrap();

        assert!(!metadata.is_silent());
        assert!(metadata.is_retryable());
        assert!(metadata.circuit_breaker_enabled());
        assert!(metadata.bulkhead_enabled());
    }

    #[rstest]
    #[case(parse_quote!(#[get]), HttpVerb::Get)]
    #[case(parse_quote!(#[post]), HttpVerb::Post)]
    #[case(parse_quote!(#[put]), HttpVerb::Put)]
    #[case(parse_quote!(#[delete]), HttpVerb::Delete)]
    #[case(parse_quote!(#[patch]), HttpVerb::Patch)]
    #[case(parse_quote!(#[options]), HttpVerb::Options)]
    #[case(parse_quote!(#[call]), HttpVerb::Post)]
    #[case(parse_quote!(#[call(method = "PATCH")]), HttpVerb::Patch)]
    #[case(parse_quote!(#[call(method = "get")]), HttpVerb::Get)]
    fn http_verbs(#[case] attr: Attribute, #[case] expected: HttpVerb) {
        let CallMetadata::Http(call) = CallMetadata::parse(&attr).unwrap() else {
            panic!("expected an HTTP call");
        };

        assert_eq!(call.verb, expected);
    }

    #[rstest]
    #[case(parse_quote!(#[unary_rpc]), RpcKind::Unary)]
    #[case(parse_quote!(#[server_stream_rpc]), RpcKind::ServerStreaming)]
    #[case(parse_quote!(#[client_stream_rpc]), RpcKind::ClientStreaming)]
    #[case(parse_quote!(#[bidi_rpc]), RpcKind::BidiStreaming)]
    #[case(parse_quote!(#[unary_rpc(method = "BIDI_STREAMING")]), RpcKind::BidiStreaming)]
    fn rpc_kinds(#[case] attr: Attribute, #[case] expected: RpcKind) {
        let CallMetadata::Rpc(call) = CallMetadata::parse(&attr).unwrap() else {
            panic!("expected an RPC call");
        };

        assert_eq!(call.kind, expected);
    }

    #[test]
    fn rpc_coordinates() {
        let attr: Attribute = parse_quote!(#[unary_rpc(service = "users", package = "acme.v1", class = "Users", method_name = "Get")]);

        let CallMetadata::Rpc(call) = CallMetadata::parse(&attr).unwrap() else {
            panic!("expected an RPC call");
        };

        assert_eq!((call.package.as_str(), call.class.as_str(), call.method_name.as_str()), ("acme.v1", "Users", "Get"));
    }

    #[rstest]
    #[case(parse_quote!(#[call(method = "TRACE")]))]
    #[case(parse_quote!(#[get(method = "GET")]))]
    #[case(parse_quote!(#[get(verb = "GET")]))]
    #[case(parse_quote!(#[unary_rpc(method = "ONEWAY")]))]
    #[case(parse_quote!(#[get = "/users"]))]
    #[case(parse_quote!(#[fetch(path = "/users")]))]
    fn rejects_malformed(#[case] attr: Attribute) {
        CallMetadata::parse(&attr).unwrap_err();
    }

    #[test]
    fn find_rejects_two_calls() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[get]), parse_quote!(#[post])];

        CallMetadata::find(&attrs).unwrap_err();
    }

    #[test]
    fn find_ignores_other_attributes() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[doc = "Fetches a user."]), parse_quote!(#[get(service = "users")])];

        let (metadata, attr) = CallMetadata::find(&attrs).unwrap().unwrap();

        assert_eq!(metadata.service(), "users");
        assert!(attr.path().is_ident("get"));
        assert!(CallMetadata::find(&attrs[..1]).unwrap().is_none());
    }
}
