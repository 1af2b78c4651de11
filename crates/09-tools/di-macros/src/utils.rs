//! 宏工具函数

use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Attribute, Expr, Ident, Result, Type};

/// 从类型中提取泛型参数
pub fn extract_generic_type(ty: &Type) -> Option<&Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                if let Some(syn::GenericArgument::Type(inner_type)) = args.args.first() {
                    return Some(inner_type);
                }
            }
        }
    }
    None
}

/// 检查类型路径的最后一段是否为指定名称
pub fn is_type_named(ty: &Type, name: &str) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == name)
            .unwrap_or(false),
        _ => false,
    }
}

/// 检查类型是否为 Option<T>
pub fn is_option_type(ty: &Type) -> bool {
    is_type_named(ty, "Option")
}

/// 提取 `Arc<T>` 中的 `T`
fn arc_inner(ty: &Type) -> Option<&Type> {
    if is_type_named(ty, "Arc") {
        extract_generic_type(ty)
    } else {
        None
    }
}

/// 将驼峰命名转换为蛇形命名
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() && i > 0 {
            let prev_is_lower = chars.get(i - 1).map_or(false, |c| c.is_lowercase());
            let next_is_lower = chars.get(i + 1).map_or(false, |c| c.is_lowercase());

            if prev_is_lower || next_is_lower {
                result.push('_');
            }
        }
        result.push(ch.to_lowercase().next().unwrap_or(ch));
    }

    result
}

/// 生成带前缀的标识符
pub fn prefixed_ident(prefix: &str, name: &str) -> Ident {
    Ident::new(&format!("{}_{}", prefix, name), Span::call_site())
}

/// 参数的注入方式，由字段或参数的类型决定
pub enum Injection<'a> {
    /// `Arc<T>`
    Shared(&'a Type),
    /// `Option<Arc<T>>`
    Optional(&'a Type),
    /// `Vec<Arc<T>>`
    List(&'a Type),
    /// 其他拥有所有权的类型，要求 `Clone`
    Owned(&'a Type),
}

impl<'a> Injection<'a> {
    /// 按类型分类
    pub fn classify(ty: &'a Type) -> Result<Self> {
        if let Type::Reference(reference) = ty {
            return Err(syn::Error::new_spanned(
                reference,
                "注入的参数必须是拥有所有权的类型，共享依赖请使用 Arc<T>",
            ));
        }
        if let Some(inner) = arc_inner(ty) {
            return Ok(Self::Shared(inner));
        }
        if is_option_type(ty) {
            if let Some(inner) = extract_generic_type(ty).and_then(arc_inner) {
                return Ok(Self::Optional(inner));
            }
        }
        if is_type_named(ty, "Vec") {
            if let Some(inner) = extract_generic_type(ty).and_then(arc_inner) {
                return Ok(Self::List(inner));
            }
        }
        Ok(Self::Owned(ty))
    }

    /// 类型键表达式
    pub fn key_tokens(&self) -> TokenStream2 {
        match self {
            Self::Shared(inner) => quote! { ::di_common::TypeKey::of::<#inner>() },
            Self::Optional(inner) => quote! { ::di_common::TypeKey::optional::<#inner>() },
            Self::List(inner) => quote! { ::di_common::TypeKey::list::<#inner>() },
            Self::Owned(ty) => quote! { ::di_common::TypeKey::of::<#ty>() },
        }
    }

    /// 从 `args` 取出参数值的表达式
    pub fn take_tokens(&self, name: &str, default: Option<&TokenStream2>) -> TokenStream2 {
        match (self, default) {
            (Self::Shared(inner), None) => quote! { args.take::<#inner>(#name)? },
            (Self::Shared(inner), Some(default)) => {
                quote! { args.take_or::<#inner, _>(#name, || #default)? }
            }
            (Self::Optional(inner), _) => quote! { args.take_optional::<#inner>(#name)? },
            (Self::List(inner), None) => {
                quote! { args.take_owned::<::std::vec::Vec<::std::sync::Arc<#inner>>>(#name)? }
            }
            (Self::List(inner), Some(default)) => quote! {
                args.take_owned_or::<::std::vec::Vec<::std::sync::Arc<#inner>>, _>(#name, || #default)?
            },
            (Self::Owned(ty), None) => quote! { args.take_owned::<#ty>(#name)? },
            (Self::Owned(ty), Some(default)) => {
                quote! { args.take_owned_or::<#ty, _>(#name, || #default)? }
            }
        }
    }
}

/// `#[inject(...)]` 中解析出的默认值
pub struct DefaultValue {
    /// 默认值表达式
    pub tokens: TokenStream2,
    /// 写入签名的字面量
    pub literal: String,
}

/// 解析 `#[inject(default)]` / `#[inject(default = expr)]`
pub fn parse_inject_default(attrs: &[Attribute]) -> Result<Option<DefaultValue>> {
    let mut default = None;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("inject")) {
        if matches!(attr.meta, syn::Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("default") {
                if meta.input.peek(syn::Token![=]) {
                    let expr: Expr = meta.value()?.parse()?;
                    default = Some(DefaultValue {
                        literal: quote!(#expr).to_string(),
                        tokens: quote!(#expr),
                    });
                } else {
                    default = Some(DefaultValue {
                        literal: "Default::default()".to_string(),
                        tokens: quote!(::core::default::Default::default()),
                    });
                }
                Ok(())
            } else {
                Err(meta.error("不支持的 inject 参数，可用: default, default = <表达式>"))
            }
        })?;
    }
    Ok(default)
}

/// 提取文档注释
pub fn extract_docs(attrs: &[Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(expr_lit) => match &expr_lit.lit {
                    syn::Lit::Str(lit_str) => Some(lit_str.value().trim().to_string()),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("MyService"), "my_service");
        assert_eq!(to_snake_case("HTTPClient"), "http_client");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_classify_shapes() {
        let shared: Type = syn::parse_quote!(Arc<dyn Greeter>);
        assert!(matches!(Injection::classify(&shared), Ok(Injection::Shared(_))));

        let optional: Type = syn::parse_quote!(Option<std::sync::Arc<Cache>>);
        assert!(matches!(Injection::classify(&optional), Ok(Injection::Optional(_))));

        let list: Type = syn::parse_quote!(Vec<Arc<Plugin>>);
        assert!(matches!(Injection::classify(&list), Ok(Injection::List(_))));

        let owned: Type = syn::parse_quote!(Option<u32>);
        assert!(matches!(Injection::classify(&owned), Ok(Injection::Owned(_))));

        let reference: Type = syn::parse_quote!(&'static str);
        assert!(Injection::classify(&reference).is_err());
    }

    #[test]
    fn test_parse_inject_default() {
        let attrs: Vec<Attribute> = vec![syn::parse_quote!(#[inject(default = 3)])];
        let default = parse_inject_default(&attrs).unwrap().unwrap();
        assert_eq!(default.literal, "3");

        let attrs: Vec<Attribute> = vec![syn::parse_quote!(#[inject])];
        assert!(parse_inject_default(&attrs).unwrap().is_none());
    }
}
