//! # tether-contract-tests-macros
//!
//! 该 crate 提供 `tether_tck` 属性宏，为传输后端的契约一致性测试模块注入标准化的
//! 测试入口。宏的实现分为三个阶段：解析调用参数（后端工厂与套件列表）、确定目标
//! 套件，以及将测试桩植入目标模块。

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Ident, ItemMod, Meta, Result as SynResult, Token, parse_macro_input};

#[proc_macro_attribute]
/// 教案级说明：
/// - **意图（Why）**：后端实现者只需声明工厂表达式与目标套件，即可获得完整的契约测试覆盖。
/// - **逻辑（How）**：先由 `parse_args` 解析 `factory = <expr>` 与可选的 `suites(...)`，
///   再由 `inject_tests` 为每个套件追加一个 `#[test]` 函数。
/// - **契约（What）**：`factory` 必填，其值须是实现 `tether_contract_tests::BackendFactory`
///   的表达式，每个生成的测试各求值一次；`suites(...)` 缺省时展开全部套件。
///
/// ```ignore
/// #[tether_tck(factory = tether_contract_tests::MemoryFactory, suites(primitives, lifecycle))]
/// mod memory_tck {}
/// ```
pub fn tether_tck(attr: TokenStream, item: TokenStream) -> TokenStream {
    let module = parse_macro_input!(item as ItemMod);

    match parse_args(attr).and_then(|args| inject_tests(args, module)) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct TckArgs {
    factory: Expr,
    suites: Vec<Ident>,
}

/// 教案级说明：
/// - **逻辑**：属性按逗号拆分为 `Meta`；`factory = <expr>` 记录工厂，`suites(...)` 收集标识符。
/// - **契约**：缺少 `factory`、重复 `factory` 或出现其它键时返回 `syn::Error`，供上层转化为诊断。
fn parse_args(attr: TokenStream) -> SynResult<TckArgs> {
    let metas = Punctuated::<Meta, Token![,]>::parse_terminated.parse(attr)?;
    let mut factory = None;
    let mut suites = Vec::new();

    for meta in metas {
        match meta {
            Meta::NameValue(pair) if pair.path.is_ident("factory") => {
                if factory.is_some() {
                    return Err(syn::Error::new(pair.span(), "factory 只能指定一次"));
                }
                factory = Some(pair.value);
            }
            Meta::List(list) if list.path.is_ident("suites") => {
                let nested: Punctuated<Meta, Token![,]> =
                    list.parse_args_with(Punctuated::parse_terminated)?;
                for meta in nested {
                    match meta {
                        Meta::Path(path) => match path.get_ident() {
                            Some(ident) => suites.push(ident.clone()),
                            None => {
                                return Err(syn::Error::new(path.span(), "suite 需为标识符"));
                            }
                        },
                        other => {
                            return Err(syn::Error::new(
                                other.span(),
                                "suites(...) 仅接受标识符",
                            ));
                        }
                    }
                }
            }
            other => {
                return Err(syn::Error::new(
                    other.span(),
                    "tether_tck 属性仅支持 factory = <expr> 与 suites(...)",
                ));
            }
        }
    }

    let factory = factory.ok_or_else(|| {
        syn::Error::new(Span::call_site(), "tether_tck 需要 factory = <expr>")
    })?;
    if suites.is_empty() {
        suites = default_suite_idents();
    }
    Ok(TckArgs { factory, suites })
}

/// 未指定套件时展开的默认清单，顺序与 `tether_contract_tests::all_suites` 一致。
fn default_suite_idents() -> Vec<Ident> {
    [
        "primitives",
        "vectors",
        "server_client",
        "direct_group",
        "lifecycle",
    ]
    .iter()
    .map(|name| Ident::new(name, Span::call_site()))
    .collect()
}

/// 教案级说明：
/// - **意图**：为每个套件生成 `<suite>_suite` 测试函数，调用 `run_<suite>_suite(&factory)`。
/// - **权衡**：需处理内联与文件模块两种情况，`module.content` 为空时重新拼装模块以保留可见性与属性。
fn inject_tests(args: TckArgs, mut module: ItemMod) -> SynResult<proc_macro2::TokenStream> {
    let factory = &args.factory;
    let mut generated = Vec::new();
    for suite in args.suites {
        let test_ident = format_ident!("{}_suite", suite);
        let run_fn: syn::Path =
            syn::parse_str(&format!("tether_contract_tests::run_{}_suite", suite))?;
        let item: syn::Item = syn::parse_quote! {
            #[test]
            fn #test_ident() {
                #run_fn(&(#factory));
            }
        };
        generated.push(item);
    }

    if let Some((_, ref mut items)) = module.content {
        items.extend(generated);
        Ok(quote! { #module })
    } else {
        let ident = &module.ident;
        let vis = &module.vis;
        let attrs = &module.attrs;
        Ok(quote! {
            #(#attrs)*
            #vis mod #ident {
                #(#generated)*
            }
        })
    }
}
