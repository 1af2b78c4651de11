//! `#[bindable]` 实现
//!
//! 为函数生成 `<函数名>_callable()`，返回带签名的可调用对象，供容器绑定

use crate::utils::{extract_docs, prefixed_ident, Injection};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Expr, FnArg, ItemFn, Pat, Result, ReturnType};

/// 实现 #[bindable] 宏
pub fn bindable_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let error = syn::Error::new(proc_macro2::Span::call_site(), "bindable 不接受参数");
        return error.to_compile_error().into();
    }
    let item = match syn::parse::<ItemFn>(input) {
        Ok(item) => item,
        Err(e) => return e.to_compile_error().into(),
    };
    match expand(item) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}

/// 参数上的标记
struct ParamMarkers {
    inject: bool,
    default: Option<Expr>,
}

/// 取出并移除参数上的 `#[inject]` 和 `#[default(...)]`
fn take_markers(attrs: &mut Vec<Attribute>) -> Result<ParamMarkers> {
    let mut markers = ParamMarkers {
        inject: false,
        default: None,
    };
    let mut kept = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        if attr.path().is_ident("inject") {
            markers.inject = true;
        } else if attr.path().is_ident("default") {
            markers.default = Some(attr.parse_args::<Expr>()?);
        } else {
            kept.push(attr);
        }
    }
    *attrs = kept;
    Ok(markers)
}

fn expand(mut item: ItemFn) -> Result<TokenStream2> {
    let sig = &item.sig;
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&sig.generics, "bindable 不支持泛型函数"));
    }

    let fn_name = sig.ident.clone();
    let fn_name_string = fn_name.to_string();
    let is_async = sig.asyncness.is_some();
    let docs = extract_docs(&item.attrs);

    let mut spec_calls = Vec::new();
    let mut bindings = Vec::new();
    let mut call_args = Vec::new();

    for input in item.sig.inputs.iter_mut() {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new_spanned(input, "bindable 只能用于自由函数"));
        };
        let markers = take_markers(&mut pat_type.attrs)?;
        let Pat::Ident(pat_ident) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new_spanned(&pat_type.pat, "bindable 的参数必须是简单的标识符"));
        };
        let ident = pat_ident.ident.clone();
        let name = ident.to_string();
        let injection = Injection::classify(&pat_type.ty)?;
        let key = injection.key_tokens();

        spec_calls.push(match &markers.default {
            Some(default) => {
                let literal = quote!(#default).to_string();
                quote! { .param_with_default(#name, #key, #literal) }
            }
            None => quote! { .param(#name, #key) },
        });
        if markers.inject {
            spec_calls.push(quote! { .inject(#name) });
        }

        let default_tokens = markers.default.as_ref().map(|default| quote!(#default));
        let take = injection.take_tokens(&name, default_tokens.as_ref());
        bindings.push(quote! { let #ident = #take; });
        call_args.push(ident);
    }

    let output = match &item.sig.output {
        ReturnType::Default => quote!(()),
        ReturnType::Type(_, ty) => quote!(#ty),
    };
    if let ReturnType::Type(_, ty) = &item.sig.output {
        spec_calls.push(quote! { .returns(::di_common::TypeKey::of::<#ty>()) });
    }
    if let Some(docs) = docs {
        spec_calls.push(quote! { .with_docs(#docs) });
    }

    let vis = &item.vis;
    let callable_fn = prefixed_ident(&fn_name_string, "callable");
    let args_ident = if bindings.is_empty() {
        quote!(_args)
    } else {
        quote!(args)
    };

    let callable = if is_async {
        quote! {
            /// 可绑定的异步可调用对象
            #vis fn #callable_fn() -> impl ::di_common::AsyncCallable<Output = #output> {
                ::di_common::AsyncFnCallable::new(
                    ::di_common::FunctionSpec::new(#fn_name_string) #(#spec_calls)*,
                    |#args_ident: &mut ::di_common::Arguments| {
                        #(#bindings)*
                        ::std::result::Result::Ok(#fn_name(#(#call_args),*))
                    },
                )
            }
        }
    } else {
        quote! {
            /// 可绑定的可调用对象
            #vis fn #callable_fn() -> impl ::di_common::Callable<Output = #output> {
                ::di_common::FnCallable::new(
                    ::di_common::FunctionSpec::new(#fn_name_string) #(#spec_calls)*,
                    |#args_ident: &mut ::di_common::Arguments| {
                        #(#bindings)*
                        ::std::result::Result::Ok(#fn_name(#(#call_args),*))
                    },
                )
            }
        }
    };

    Ok(quote! {
        #item

        #callable
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_stripped() {
        let item: ItemFn = syn::parse_quote! {
            /// 发送邮件
            fn send(#[inject] mailer: Arc<Mailer>, #[default(3)] retries: u32, to: String) -> bool {
                true
            }
        };
        let expanded = expand(item).unwrap().to_string();
        assert!(expanded.contains("send_callable"));
        assert!(expanded.contains("inject (\"mailer\")"));
        assert!(expanded.contains("param_with_default"));
        assert!(!expanded.contains("# [inject]"));
    }

    #[test]
    fn test_methods_rejected() {
        let item: ItemFn = syn::parse_quote! {
            fn run(&self) {}
        };
        assert!(expand(item).is_err());
    }
}
