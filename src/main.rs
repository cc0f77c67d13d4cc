//! action-gateway server entry point.
//!
//! Loads configuration, registers the demo services on an in-process
//! broker when enabled, and runs the gateway until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use action_gateway::app_state::GatewayContext;
use action_gateway::config::GatewayConfig;
use action_gateway::domain::{BrokerError, LocalBroker, LocalService};
use action_gateway::service::GatewayService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("GATEWAY_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = GatewayConfig::from_env().context("loading gateway configuration")?;
    tracing::info!(
        ip = %config.settings.ip,
        port = config.settings.port,
        routes = config.settings.routes.len(),
        "starting action-gateway"
    );

    // Build domain layer
    let broker = Arc::new(LocalBroker::new());
    if config.demo_services {
        register_demo_services(&broker).await?;
    }
    let context = GatewayContext::new(Arc::clone(&broker), Arc::clone(&broker));

    // Start server
    let gateway = GatewayService::start(&config.settings, context, config.event_capacity)
        .await
        .context("starting gateway")?;
    tracing::info!(addr = %gateway.startup_report().addr, "gateway ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl+C")?;
    tracing::info!("shutdown requested");
    gateway.stop().await?;

    Ok(())
}

async fn register_demo_services(broker: &LocalBroker) -> anyhow::Result<()> {
    let math = LocalService::new("math")
        .action("add", |params: Value| async move {
            let (a, b) = operands(&params)?;
            Ok(json!({ "sum": number(a + b) }))
        })
        .action("sub", |params: Value| async move {
            let (a, b) = operands(&params)?;
            Ok(json!({ "difference": number(a - b) }))
        });
    let greeter = LocalService::new("greeter").action("hello", |params: Value| async move {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("world");
        Ok(json!({ "message": format!("Hello, {name}!") }))
    });

    for service in [math, greeter] {
        let name = service.name().to_string();
        broker
            .register(service)
            .await
            .with_context(|| format!("registering demo service {name}"))?;
    }
    Ok(())
}

/// Reads numeric `a` and `b` params, accepting numbers or numeric strings.
fn operands(params: &Value) -> Result<(f64, f64), BrokerError> {
    let read = |key: &str| {
        let value = params.get(key);
        value
            .and_then(Value::as_f64)
            .or_else(|| value.and_then(Value::as_str).and_then(|s| s.parse().ok()))
            .ok_or_else(|| BrokerError::Action {
                message: format!("param {key:?} must be a number"),
                data: Some(json!({ "param": key })),
            })
    };
    Ok((read("a")?, read("b")?))
}

/// Whole results are written as integers.
fn number(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < 9_007_199_254_740_992.0 {
        json!(x as i64)
    } else {
        json!(x)
    }
}
