//! `#[derive(Injectable)]` 实现

use crate::utils::{parse_inject_default, prefixed_ident, to_snake_case, Injection};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

/// 实现 #[derive(Injectable)] 宏
pub fn derive_injectable_impl(input: DeriveInput) -> TokenStream {
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> Result<TokenStream2> {
    let struct_name = &input.ident;
    let struct_name_string = struct_name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Injectable 只能用于结构体",
            ))
        }
    };

    let mut params = Vec::new();
    let mut initializers = Vec::new();
    match fields {
        Fields::Named(named) => {
            for field in &named.named {
                let Some(ident) = field.ident.as_ref() else {
                    continue;
                };
                let name = ident.to_string();
                let injection = Injection::classify(&field.ty)?;
                let key = injection.key_tokens();
                let default = parse_inject_default(&field.attrs)?;

                params.push(match &default {
                    Some(default) => {
                        let literal = &default.literal;
                        quote! { .param_with_default(#name, #key, #literal) }
                    }
                    None => quote! { .param(#name, #key) },
                });
                let take = injection.take_tokens(&name, default.as_ref().map(|d| &d.tokens));
                initializers.push(quote! { #ident: #take });
            }
        }
        Fields::Unit => {}
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                struct_name,
                "Injectable 只支持具名字段的结构体或单元结构体",
            ))
        }
    }

    let construct_body = match fields {
        Fields::Unit => quote! { ::std::result::Result::Ok(Self) },
        _ => quote! { ::std::result::Result::Ok(Self { #(#initializers),* }) },
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let args_ident = if initializers.is_empty() {
        quote!(_args)
    } else {
        quote!(args)
    };

    let injectable_impl = quote! {
        impl #impl_generics ::di_common::Injectable for #struct_name #ty_generics #where_clause {
            fn signature() -> ::di_common::FunctionSpec {
                ::di_common::FunctionSpec::new(#struct_name_string)
                    #(#params)*
            }

            fn construct(
                #args_ident: &mut ::di_common::Arguments,
            ) -> ::di_common::DependencyResult<Self> {
                #construct_body
            }
        }
    };

    // 泛型类型需要调用方按具体类型手动注册
    let registration_code = if input.generics.params.is_empty() {
        let registration_fn_name = prefixed_ident("__register_injectable", &to_snake_case(&struct_name_string));
        quote! {
            // 使用 ctor 在程序启动时注册反射信息
            #[ctor::ctor]
            fn #registration_fn_name() {
                ::di_common::register_injectable::<#struct_name>();
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        #injectable_impl

        #registration_code
    })
}
