use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use warren::{
    Backend, BackendRegistry, Client, ClientOptions, Command, Delivery, Message,
    MessageAttributes, MessageFilters, Verbosity, WarrenError,
};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Shared state for a backend that replays a canned delivery sequence and
/// records what was submitted to it.
#[derive(Debug, Default)]
struct Script {
    deliveries: Mutex<Vec<Delivery>>,
    submitted: Mutex<Vec<String>>,
    reject: bool,
}

impl Script {
    fn with_deliveries(deliveries: Vec<Delivery>) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(deliveries),
            ..Self::default()
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject: true,
            ..Self::default()
        })
    }

    fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct ScriptedBackend(Arc<Script>);

impl Backend for ScriptedBackend {
    fn submit(&mut self, command: Command) -> warren::Result<()> {
        if self.0.reject {
            return Err(WarrenError::SubmissionRejected("scripted refusal".into()));
        }
        self.0
            .submitted
            .lock()
            .unwrap()
            .push(command.kind().to_string());
        Ok(())
    }

    fn process(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = warren::Result<Vec<Delivery>>> + Send + '_>> {
        let deliveries = std::mem::take(&mut *self.0.deliveries.lock().unwrap());
        Box::pin(async move { Ok(deliveries) })
    }
}

fn scripted_client(script: &Arc<Script>, options: ClientOptions) -> Client {
    let mut registry = BackendRegistry::new();
    let handle = script.clone();
    registry.register("scripted", 0, move |_config| {
        Ok(Box::new(ScriptedBackend(handle.clone())))
    });
    Client::builder()
        .backend("scripted")
        .registry(registry)
        .options(options)
        .build()
        .unwrap()
}

/// Point every handler slot at a shared event log.
fn record_all(client: &mut Client, events: &Arc<Mutex<Vec<String>>>) {
    let sink = events.clone();
    client.on_message(move |m| sink.lock().unwrap().push(format!("message:{}", m.id)));
    let sink = events.clone();
    client.on_queues(move |names| {
        sink.lock().unwrap().push(format!("queues:{}", names.join(",")));
    });
    let sink = events.clone();
    client.on_accounts(move |names| {
        sink.lock()
            .unwrap()
            .push(format!("accounts:{}", names.join(",")));
    });
    let sink = events.clone();
    client.on_log(move |level, text| sink.lock().unwrap().push(format!("log:{level}:{text}")));
    let sink = events.clone();
    client.on_complete(move || sink.lock().unwrap().push("complete".into()));
}

fn message(id: &str) -> Delivery {
    Delivery::Message(Message::new(id, b"payload".to_vec(), MessageAttributes::new()))
}

// ---------------------------------------------------------------------------
// Delivery ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_results_precede_completion() {
    let script = Script::with_deliveries(vec![message("m1"), Delivery::Complete]);
    let mut client = scripted_client(&script, ClientOptions::AUTOPROCESS);
    let events = Arc::new(Mutex::new(Vec::new()));
    record_all(&mut client, &events);

    client.get_message("acct", "jobs", "m1").await.unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["message:m1", "complete"]);
    assert_eq!(script.submitted(), vec!["get_message"]);
}

#[tokio::test]
async fn test_completion_alone_is_the_empty_outcome() {
    let script = Script::with_deliveries(vec![Delivery::Complete]);
    let mut client = scripted_client(&script, ClientOptions::AUTOPROCESS);
    let events = Arc::new(Mutex::new(Vec::new()));
    record_all(&mut client, &events);

    client.get_messages("acct", "jobs").await.unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["complete"]);
}

#[tokio::test]
async fn test_error_log_does_not_suppress_completion() {
    let script = Script::with_deliveries(vec![
        Delivery::log(Verbosity::Error, "backend exploded"),
        Delivery::Complete,
    ]);
    let mut client = scripted_client(&script, ClientOptions::AUTOPROCESS);
    let events = Arc::new(Mutex::new(Vec::new()));
    record_all(&mut client, &events);

    client.delete_messages("acct", "jobs").await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["log:error:backend exploded", "complete"]
    );
}

#[tokio::test]
async fn test_interleaving_across_commands_preserved() {
    let script = Script::with_deliveries(vec![
        Delivery::Accounts(vec!["acct".into()]),
        Delivery::Complete,
        Delivery::Queues(vec!["jobs".into()]),
        Delivery::Complete,
    ]);
    let mut client = scripted_client(&script, ClientOptions::empty());
    let events = Arc::new(Mutex::new(Vec::new()));
    record_all(&mut client, &events);

    client.get_accounts().await.unwrap();
    client.get_queues("acct").await.unwrap();
    assert!(events.lock().unwrap().is_empty());

    client.process().await.unwrap();
    assert_eq!(
        *events.lock().unwrap(),
        vec!["accounts:acct", "complete", "queues:jobs", "complete"]
    );
    assert_eq!(script.submitted(), vec!["get_accounts", "get_queues"]);
}

// ---------------------------------------------------------------------------
// Rejection and unhandled classes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejected_submission_delivers_nothing() {
    let script = Script::rejecting();
    let mut client = scripted_client(&script, ClientOptions::AUTOPROCESS);
    let events = Arc::new(Mutex::new(Vec::new()));
    record_all(&mut client, &events);

    let err = client
        .create_message("acct", "jobs", "m1", b"payload".to_vec())
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, WarrenError::SubmissionRejected(_)));

    client.process().await.unwrap();
    assert!(events.lock().unwrap().is_empty());
    assert!(script.submitted().is_empty());
}

#[tokio::test]
async fn test_unhandled_classes_are_dropped_not_buffered() {
    let script = Script::with_deliveries(vec![
        message("m1"),
        Delivery::Queues(vec!["jobs".into()]),
        Delivery::Accounts(vec!["acct".into()]),
        Delivery::log(Verbosity::Info, "routine"),
        Delivery::Complete,
    ]);
    let mut client = scripted_client(&script, ClientOptions::AUTOPROCESS);

    let completes = Arc::new(AtomicUsize::new(0));
    let counter = completes.clone();
    client.on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    client.get_messages("acct", "jobs").await.unwrap();
    assert_eq!(completes.load(Ordering::SeqCst), 1);

    // Registering a handler afterwards sees nothing: the dropped
    // deliveries were not buffered.
    let messages = Arc::new(AtomicUsize::new(0));
    let counter = messages.clone();
    client.on_message(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    client.process().await.unwrap();
    assert_eq!(messages.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Operation descriptors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_every_operation_reaches_the_backend() {
    let script = Script::with_deliveries(Vec::new());
    let mut client = scripted_client(&script, ClientOptions::empty());
    let attrs = MessageAttributes::new().with_ttl(300);
    let filters = MessageFilters::new().with_limit(10);

    client
        .create_message("acct", "jobs", "m1", b"payload".to_vec())
        .attributes(&attrs)
        .await
        .unwrap();
    client
        .update_message("acct", "jobs", "m1")
        .attributes(&attrs)
        .await
        .unwrap();
    client
        .update_messages("acct", "jobs")
        .attributes(&attrs)
        .filters(&filters)
        .await
        .unwrap();
    client.get_message("acct", "jobs", "m1").await.unwrap();
    client
        .get_messages("acct", "jobs")
        .filters(&filters)
        .await
        .unwrap();
    client.delete_message("acct", "jobs", "m1").await.unwrap();
    client.delete_messages("acct", "jobs").await.unwrap();
    client.get_queues("acct").await.unwrap();
    client.delete_queues("acct").await.unwrap();
    client.get_accounts().await.unwrap();
    client.delete_accounts().await.unwrap();

    assert_eq!(
        script.submitted(),
        vec![
            "create_message",
            "update_message",
            "update_messages",
            "get_message",
            "get_messages",
            "delete_message",
            "delete_messages",
            "get_queues",
            "delete_queues",
            "get_accounts",
            "delete_accounts",
        ]
    );
}

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

#[test]
fn test_verbosity_ordering_and_display() {
    assert!(Verbosity::Debug < Verbosity::Info);
    assert!(Verbosity::Info < Verbosity::Warn);
    assert!(Verbosity::Warn < Verbosity::Error);
    assert!(Verbosity::Error < Verbosity::Fatal);

    assert!(!Verbosity::Debug.is_error());
    assert!(!Verbosity::Info.is_error());
    assert!(!Verbosity::Warn.is_error());
    assert!(Verbosity::Error.is_error());
    assert!(Verbosity::Fatal.is_error());

    assert_eq!(Verbosity::Warn.to_string(), "warn");
    assert_eq!(Verbosity::Fatal.to_string(), "fatal");
}
