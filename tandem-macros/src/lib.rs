//! Procedural macros for Tandem.

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Runs an `async fn` test on a fresh Tandem runtime.
///
/// Accepts an optional `worker_threads = N` argument.
///
/// ```rust,ignore
/// #[tandem::test(worker_threads = 2)]
/// async fn acquires() {
///     let mutex = Mutex::new(Duration::from_secs(1));
///     assert!(mutex.try_acquire_async(None, WaitOptions::empty()).await.is_success());
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let worker_threads = match parse_worker_threads(&attr.to_string()) {
        Ok(worker_threads) => worker_threads,
        Err(message) => return compile_error(&message),
    };

    let mut tokens = item.into_iter().collect::<Vec<_>>();

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return compile_error("#[tandem::test] expects an `async fn`");
    };
    tokens.remove(async_pos);

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return compile_error("#[tandem::test] expects a function body");
    };

    let TokenTree::Group(body) = &tokens[pos] else {
        return compile_error("#[tandem::test] expects a function body");
    };

    let mut builder = String::from("::tandem::RuntimeBuilder::new()");
    if let Some(n) = worker_threads {
        builder.push_str(&format!(".worker_threads({n})"));
    }
    builder.push_str(".build()");

    let new_body = format!(
        "{{
            let runtime = {builder};
            runtime.block_on(async move {{ {} }})
        }}",
        body.stream()
    );

    let new_body = match new_body.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => return compile_error(&format!("#[tandem::test] failed to expand: {err}")),
    };
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_body));

    let mut output: TokenStream = "#[::core::prelude::v1::test]".parse().unwrap_or_default();
    output.extend(tokens);
    output
}

fn parse_worker_threads(attr: &str) -> Result<Option<usize>, String> {
    let mut worker_threads = None;

    for part in attr.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let Some(value) = part.strip_prefix("worker_threads") else {
            return Err(format!("unknown #[tandem::test] argument `{part}`"));
        };

        let value = value.trim_start().trim_start_matches('=').trim();
        match value.parse::<usize>() {
            Ok(n) if n > 0 => worker_threads = Some(n),
            _ => return Err(format!("invalid worker_threads value `{value}`")),
        }
    }

    Ok(worker_threads)
}

fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
