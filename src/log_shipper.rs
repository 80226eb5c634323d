use std::{fmt, time::Duration};

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{
    field::{Field, Visit},
    Event, Subscriber,
};
use tracing_subscriber::{layer::Context, Layer};

const CHANNEL_CAPACITY: usize = 10_000;
const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// Events from the HTTP client itself would feed back into the shipper
const IGNORED_TARGETS: &[&str] = &["reqwest", "hyper", "h2", "rustls"];

/// Ships log events to a remote collector in JSON batches.
///
/// Events are buffered in a bounded channel and dropped when it is full, so
/// logging never blocks a request.
pub struct LogShipper {
    sender: mpsc::Sender<Value>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    service: String,
}

impl LogShipper {
    /// Starts the background shipping task. Must be called inside a Tokio runtime.
    pub fn spawn(
        url: String,
        api_key: Option<String>,
        service: &str,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown, shutdown_receiver) = oneshot::channel();

        let sink = Sink {
            client,
            url,
            api_key,
        };
        let task = tokio::spawn(run(receiver, shutdown_receiver, sink));

        Ok(Self {
            sender,
            shutdown,
            task,
            service: service.to_string(),
        })
    }

    pub fn layer(&self) -> LogShipperLayer {
        LogShipperLayer::new(self.sender.clone(), self.service.clone())
    }

    /// Flushes buffered events and stops the background task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await.is_err() {
            eprintln!("log shipper: timed out flushing logs on shutdown");
        }
    }
}

impl fmt::Debug for LogShipper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogShipper")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

struct Sink {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl Sink {
    async fn send(&self, batch: &mut Vec<Value>) {
        let mut request = self.client.post(&self.url).json(&*batch);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        // Tracing here would loop back into the shipper
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                eprintln!("log shipper: collector responded with {}", response.status());
            }
            Ok(_) => {}
            Err(error) => eprintln!("log shipper: failed to send logs: {error}"),
        }

        batch.clear();
    }
}

async fn run(
    mut receiver: mpsc::Receiver<Value>,
    mut shutdown: oneshot::Receiver<()>,
    sink: Sink,
) {
    let mut batch = Vec::with_capacity(BATCH_SIZE);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            entry = receiver.recv() => {
                let Some(entry) = entry else { break };
                batch.push(entry);
                if batch.len() >= BATCH_SIZE {
                    sink.send(&mut batch).await;
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    sink.send(&mut batch).await;
                }
            }
            _ = &mut shutdown => {
                while let Ok(entry) = receiver.try_recv() {
                    batch.push(entry);
                }
                break;
            }
        }
    }

    if !batch.is_empty() {
        sink.send(&mut batch).await;
    }
}

/// Tracing layer that converts events to JSON and hands them to the shipper.
#[derive(Debug, Clone)]
pub struct LogShipperLayer {
    sender: mpsc::Sender<Value>,
    service: String,
}

impl LogShipperLayer {
    pub(crate) const fn new(sender: mpsc::Sender<Value>, service: String) -> Self {
        Self { sender, service }
    }
}

impl<S: Subscriber> Layer<S> for LogShipperLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if IGNORED_TARGETS
            .iter()
            .any(|target| metadata.target().starts_with(target))
        {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": metadata.level().to_string(),
            "target": metadata.target(),
            "service": self.service,
            "message": visitor.message.unwrap_or_default(),
            "fields": visitor.fields,
        });

        // Full channel: drop the event
        let _ = self.sender.try_send(entry);
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(message) => message,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, json!(format!("{value:?}")));
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;

    #[test]
    fn converts_events_to_json_entries() {
        let (sender, mut receiver) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry()
            .with(LogShipperLayer::new(sender, "orders".to_string()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(user_id = 42, admin = false, "user signed in");
        });

        let entry = receiver.try_recv().unwrap();
        assert_eq!(entry["level"], json!("WARN"));
        assert_eq!(entry["service"], json!("orders"));
        assert_eq!(entry["message"], json!("user signed in"));
        assert_eq!(entry["fields"]["user_id"], json!(42));
        assert_eq!(entry["fields"]["admin"], json!(false));
    }

    #[test]
    fn drops_events_when_channel_is_full() {
        let (sender, mut receiver) = mpsc::channel(1);
        let subscriber = tracing_subscriber::registry()
            .with(LogShipperLayer::new(sender, "orders".to_string()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            tracing::info!("second");
        });

        assert_eq!(receiver.try_recv().unwrap()["message"], json!("first"));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn skips_http_client_events() {
        let (sender, mut receiver) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry()
            .with(LogShipperLayer::new(sender, "orders".to_string()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "hyper::client", "connecting");
        });

        assert!(receiver.try_recv().is_err());
    }
}
