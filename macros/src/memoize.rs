use syn::parse::{Parse, ParseStream};

use super::*;
use crate::utils::parse_key_value;

/// Arguments of the `#[memoize]` attribute.
pub struct Meta {
    name: Option<syn::LitStr>,
    policy: Option<syn::Expr>,
}

mod kw {
    syn::custom_keyword!(name);
    syn::custom_keyword!(policy);
}

impl Parse for Meta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut meta = Self { name: None, policy: None };
        while !input.is_empty() {
            if let Some(name) = parse_key_value::<kw::name, syn::LitStr>(input)? {
                meta.name = Some(name);
            } else if let Some(policy) = parse_key_value::<kw::policy, syn::Expr>(input)? {
                meta.policy = Some(policy);
            } else {
                return Err(input.error("memoflight: expected `name` or `policy`"));
            }
        }
        Ok(meta)
    }
}

/// Memoize a function.
pub fn expand(meta: Meta, mut func: syn::ItemFn) -> Result<proc_macro2::TokenStream> {
    if let Some(asyncness) = &func.sig.asyncness {
        bail!(asyncness, "async functions are not supported");
    }

    if !func.sig.generics.params.is_empty() {
        bail!(func.sig.generics, "generic functions are not supported");
    }

    let mut args = vec![];
    let mut types = vec![];
    for input in &func.sig.inputs {
        let typed = match input {
            syn::FnArg::Typed(typed) => typed,
            syn::FnArg::Receiver(_) => {
                bail!(input, "methods are not supported")
            }
        };

        let name = match typed.pat.as_ref() {
            syn::Pat::Ident(syn::PatIdent {
                by_ref: None,
                mutability: None,
                ident,
                subpat: None,
                ..
            }) => ident,
            pat => bail!(pat, "only simple identifiers are supported"),
        };

        let ty = typed.ty.as_ref();
        match ty {
            syn::Type::Reference(_) => bail!(ty, "arguments must be owned"),
            syn::Type::ImplTrait(_) => bail!(ty, "`impl Trait` arguments are not supported"),
            _ => {}
        }

        args.push(name);
        types.push(ty);
    }

    let output = match &func.sig.output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => {
            if let syn::Type::ImplTrait(_) = ty.as_ref() {
                bail!(ty, "`impl Trait` return types are not supported");
            }
            quote! { #ty }
        }
    };

    // Construct a tuple from all arguments and one from their types.
    let arg_tuple = quote! { (#(#args,)*) };
    let type_tuple = quote! { (#(#types,)*) };

    // Construct the inner closure.
    let body = &func.block;
    let closure = quote! { |#arg_tuple: #type_tuple| -> #output #body };

    let name = match &meta.name {
        Some(name) => name.value(),
        None => func.sig.ident.to_string(),
    };

    let policy = match &meta.policy {
        Some(policy) => quote! { #policy },
        None => quote! { ::memoflight::EvictionPolicy::Forever },
    };

    // Adjust the function's body.
    func.block = parse_quote! { {
        static MEMOIZER: ::std::sync::LazyLock<
            ::memoflight::Memoizer<#type_tuple, #output>,
        > = ::std::sync::LazyLock::new(|| {
            ::memoflight::internal::memoizer(#name, #policy, #closure)
        });
        ::memoflight::internal::invoke(&MEMOIZER, #arg_tuple)
    } };

    Ok(quote! { #func })
}
