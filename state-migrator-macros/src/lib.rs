use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Data, DeriveInput, ImplItem, ImplItemFn, ItemImpl, Stmt,
    Variant, Visibility,
};

/// Turns an enum into a state migrator error type.
///
/// The macro:
/// 1. Adds `#[derive(Debug, thiserror::Error, uniffi::Error)]` and `#[uniffi(flat_error)]`
/// 2. Appends a `Generic { message: String }` variant unless one is declared
/// 3. Implements `From<anyhow::Error>`, keeping the whole cause chain in `message`, so
///    `anyhow` results propagate with `?`
///
/// # Usage
///
/// ```rust,ignore
/// #[state_error]
/// pub enum StoreError {
///     #[error("missing key: {key}")]
///     MissingKey { key: String },
/// }
/// ```
#[proc_macro_attribute]
pub fn state_error(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "state_error can only be applied to enums")
            .to_compile_error()
            .into();
    };

    let enum_name = &input.ident;
    let visibility = &input.vis;
    let generics = &input.generics;

    // Derives and uniffi attributes are re-emitted below.
    let attrs: Vec<_> = input
        .attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("derive") && !attr.path().is_ident("uniffi"))
        .collect();

    let mut variants = data_enum.variants.clone();
    if !variants.iter().any(|variant| variant.ident == "Generic") {
        let generic_variant: Variant = syn::parse_quote! {
            /// A generic error wrapping an `anyhow` error chain.
            #[error("Generic error: {message}")]
            Generic {
                /// The flattened error chain.
                message: String
            }
        };
        variants.push(generic_variant);
    }

    let expanded = quote! {
        #[allow(unused_imports)]
        use anyhow::Context;

        #[derive(Debug, thiserror::Error, uniffi::Error)]
        #[uniffi(flat_error)]
        #(#attrs)*
        #visibility enum #enum_name #generics {
            #variants
        }

        impl #generics #enum_name #generics {
            fn flatten_anyhow_chain(err: &anyhow::Error) -> String {
                let mut message = err.to_string();
                let chain: Vec<String> = err.chain().skip(1).map(|e| e.to_string()).collect();
                if !chain.is_empty() {
                    message.push_str(" (caused by: ");
                    message.push_str(&chain.join(" -> "));
                    message.push(')');
                }
                message
            }
        }

        impl #generics From<anyhow::Error> for #enum_name #generics {
            fn from(err: anyhow::Error) -> Self {
                Self::Generic {
                    message: Self::flatten_anyhow_chain(&err),
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Wraps `uniffi::export` and scopes a logging context to every public method.
///
/// The macro:
/// 1. Forwards its arguments to `#[uniffi::export]`
/// 2. Prepends `let _state_logger_ctx = crate::primitives::logger::LogContext::new("TypeName");`
///    to every `pub fn` in the impl block
/// 3. Adds `async_runtime = "tokio"` when a public method is async
///
/// # Usage
///
/// ```rust,ignore
/// #[state_export]
/// impl MigrationRunner {
///     pub async fn migrate_to_latest(&self) -> Result<MigrationRunSummary, MigrationError> {
///         // logs are prefixed with [MigrationRunner]
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn state_export(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_impl = parse_macro_input!(input as ItemImpl);

    let type_name = match &*input_impl.self_ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| "Unknown".to_string(), |segment| segment.ident.to_string()),
        _ => "Unknown".to_string(),
    };

    let has_async_functions = has_async_functions_in_impl(&input_impl.items);

    let new_items = input_impl
        .items
        .iter()
        .map(|item| match item {
            ImplItem::Fn(method) if matches!(method.vis, Visibility::Public(_)) => {
                let mut method = method.clone();
                inject_logging_context(&mut method, &type_name);
                ImplItem::Fn(method)
            }
            other => other.clone(),
        })
        .collect();

    let new_impl = ItemImpl {
        items: new_items,
        ..input_impl
    };

    let mut args = proc_macro2::TokenStream::from(args);
    if has_async_functions {
        args = with_tokio_runtime(args);
    }

    quote! {
        #[uniffi::export(#args)]
        #new_impl
    }
    .into()
}

/// Appends `async_runtime = "tokio"` to the export arguments
fn with_tokio_runtime(args: proc_macro2::TokenStream) -> proc_macro2::TokenStream {
    if args.is_empty() {
        quote! { async_runtime = "tokio" }
    } else {
        quote! { #args, async_runtime = "tokio" }
    }
}

/// Whether any public function in the impl block is async
fn has_async_functions_in_impl(impl_items: &[ImplItem]) -> bool {
    impl_items.iter().any(|item| {
        if let ImplItem::Fn(method) = item {
            matches!(method.vis, Visibility::Public(_)) && method.sig.asyncness.is_some()
        } else {
            false
        }
    })
}

fn inject_logging_context(method: &mut ImplItemFn, type_name: &str) {
    let context_stmt: Stmt = syn::parse_quote! {
        let _state_logger_ctx = crate::primitives::logger::LogContext::new(#type_name);
    };
    method.block.stmts.insert(0, context_stmt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_detection_with_async_functions() {
        let impl_block: ItemImpl = syn::parse_quote! {
            impl MigrationRunner {
                pub fn latest_version(&self) -> u32 {
                    24
                }

                pub async fn migrate_to_latest(&self) -> u32 {
                    24
                }
            }
        };

        assert!(has_async_functions_in_impl(&impl_block.items));
    }

    #[test]
    fn test_async_detection_without_async_functions() {
        let impl_block: ItemImpl = syn::parse_quote! {
            impl MigrationRunner {
                pub fn latest_version(&self) -> u32 {
                    24
                }
            }
        };

        assert!(!has_async_functions_in_impl(&impl_block.items));
    }

    #[test]
    fn test_async_detection_ignores_private_async_functions() {
        let impl_block: ItemImpl = syn::parse_quote! {
            impl MigrationRunner {
                pub fn latest_version(&self) -> u32 {
                    24
                }

                async fn run_step(&self) {}
            }
        };

        assert!(!has_async_functions_in_impl(&impl_block.items));
    }

    #[test]
    fn test_tokio_runtime_argument() {
        let args = with_tokio_runtime(proc_macro2::TokenStream::new());
        assert_eq!(args.to_string(), "async_runtime = \"tokio\"");

        let args = with_tokio_runtime(quote! { name = "Runner" });
        assert_eq!(
            args.to_string(),
            "name = \"Runner\" , async_runtime = \"tokio\""
        );
    }

    #[test]
    fn test_logging_context_is_first_statement() {
        let mut method: ImplItemFn = syn::parse_quote! {
            pub fn current_version(&self) -> u32 {
                0
            }
        };
        inject_logging_context(&mut method, "MigrationRunner");

        assert_eq!(method.block.stmts.len(), 2);
        let first = &method.block.stmts[0];
        let rendered = quote!(#first).to_string();
        assert!(rendered.contains("_state_logger_ctx"));
        assert!(rendered.contains("LogContext"));
        assert!(rendered.contains("\"MigrationRunner\""));
    }
}
