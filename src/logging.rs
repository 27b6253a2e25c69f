//! Structured logging setup.
//!
//! Progress lines go to standard output; `RUST_LOG` overrides the default
//! filter directive.
//!
//! 结构化日志初始化。进度信息写入标准输出，`RUST_LOG` 可覆盖默认过滤规则。

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. A second call is a no-op.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stdout))
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_harmless() {
        super::init("tls_echo=debug");
        super::init("tls_echo=info");
        tracing::info!("logging initialised");
    }
}
