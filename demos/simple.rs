use std::{sync::Arc, time::SystemTime};

use tracing_subscriber::EnvFilter;
use wiring::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

#[derive(Default)]
struct LoggerImpl;

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
    prefix: Arc<String>,
}

impl DateLoggerImpl {
    fn new(logger: Arc<dyn Logger>, prefix: Arc<String>) -> Self {
        Self { logger, prefix }
    }
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let seconds = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        self.logger
            .log(&format!("{} {}s since epoch", self.prefix, seconds));
    }
}

// Describe how to build the implementations
injectable!(LoggerImpl);
injectable!(DateLoggerImpl => new(logger: dyn Logger, prefix => String));

/// A resource opened per scope
struct Session {
    id: u32,
}

#[tokio::main]
async fn main() -> Result<(), WiringError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut container = Container::new();
    bind!(container, ServiceLifetime::Singleton, dyn Logger => LoggerImpl)?;
    bind!(container, ServiceLifetime::Transient, dyn DateLogger => DateLoggerImpl)?;
    container
        .bind_named_instance("prefix", Arc::new(String::from("[demo]")))?
        .bind_async_resource(ServiceLifetime::Scoped, || async {
            Managed::with_async_teardown(Session { id: 7 }, |session| async move {
                println!("closing session {}", session.id);
            })
        })?;

    let services = container.build()?;

    let b: Arc<dyn DateLogger> = services.get()?;
    b.log_date();

    let scope = services.create_scope();
    let session: Arc<Session> = scope.aget().await?;
    let logger: Arc<dyn Logger> = scope.get()?;
    logger.log(&format!("using session {}", session.id));
    scope.aclose().await;

    services
        .aexec(|logger: Arc<dyn Logger>, session: Arc<Session>| async move {
            logger.log(&format!("executed with session {}", session.id));
        })
        .await?;

    Ok(())
}
