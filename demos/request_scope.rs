use std::io::Cursor;

use gcp_log_context::http_payload::{HttpPayload, RemoteAddr};
use gcp_log_context::logger::Logger;
use gcp_log_context::record::Severity;
use gcp_log_context::report::report;

fn main() {
    // Diagnostics of the crate itself (unserializable fields, write errors).
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let (root, warning) = match Logger::from_env() {
        Ok(built) => built,
        Err(e) => {
            eprintln!("cannot build logger: {e}");
            std::process::exit(2);
        }
    };
    if let Some(warning) = warning {
        root.warn(&warning.to_string());
    }

    let logger = root.with_label("component", "checkout");
    logger.info("service started");

    let mut request = http::Request::builder()
        .method("POST")
        .uri("https://shop.example.com/cart/checkout")
        .header(http::header::USER_AGENT, "demo-client/1.0")
        .body(Cursor::new(r#"{"items":3}"#))
        .expect("valid request");
    request.extensions_mut().insert(RemoteAddr("203.0.113.7:51234".into()));
    let response = http::Response::builder()
        .status(402)
        .body(Cursor::new("payment required"))
        .expect("valid response");

    let payload = HttpPayload::new(Some(request.into()), Some(response.into()));
    let scoped = logger
        .with_label("cart", "c-981")
        .with_field("items", 3)
        .with_structured_field(payload.field());

    scoped.infof(format_args!("checkout answered with {}", payload.status));

    let err = std::io::Error::new(std::io::ErrorKind::Other, "card declined");
    scoped.error("payment failed", Some(&err));
    scoped.log(
        Severity::Warning,
        "declined card reported",
        Some(&err),
        [report(&gcp_log_context::frame!()).field()],
    );
}
