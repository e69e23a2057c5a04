//! Procedural macros shared by rollup crates.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Error, ItemFn, LitStr};

/// Run a test function with a tracing subscriber that writes to the test output.
///
/// Takes an optional log level (`"TRACE"`, `"DEBUG"`, `"INFO"`, `"WARN"` or `"ERROR"`), defaulting
/// to `"DEBUG"`. Callers must depend on `tracing` and `tracing-subscriber`.
///
/// # Example
/// ```rust,ignore
/// use rollup_macros::test_traced;
///
/// #[test_traced("INFO")]
/// fn test_insert() {
///     tracing::info!("visible");
///     tracing::debug!("filtered");
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let level = if attr.is_empty() {
        "DEBUG".to_string()
    } else {
        parse_macro_input!(attr as LitStr).value()
    };
    let level = match level.to_uppercase().as_str() {
        "TRACE" => quote! { ::tracing::Level::TRACE },
        "DEBUG" => quote! { ::tracing::Level::DEBUG },
        "INFO" => quote! { ::tracing::Level::INFO },
        "WARN" => quote! { ::tracing::Level::WARN },
        "ERROR" => quote! { ::tracing::Level::ERROR },
        other => {
            return Error::new(
                proc_macro2::Span::call_site(),
                format!("invalid log level: {other}"),
            )
            .to_compile_error()
            .into();
        }
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let name = &input.sig.ident;
    let body = &input.block;

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #body);
        }
    };
    TokenStream::from(expanded)
}
