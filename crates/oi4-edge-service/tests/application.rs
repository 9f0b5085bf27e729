use oi4_edge_core::model::{
    Health, HealthState, LocalizedText, MasterAssetModel, PublishConfig, ReferenceDesignation,
    RtLicense,
};
use oi4_edge_core::{Addressing, Filter, MethodType, ResourceType, ServiceType, StatusCode};
use oi4_edge_proto::{NetworkMessage, Topic};
use oi4_edge_service::transport::topic_matches;
use oi4_edge_service::{
    Application, ApplicationConfig, ApplicationError, ApplicationSource, AssetSource,
    MessageHandler, PublicationConfig, SchedulerError, Source, Subscription, SubscriptionHandler,
    Transport, TransportError,
};
use rumqttc::QoS;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_test::assert_ok;

const APP: &str = "acme.com/edge/E1/1";
const ASSET: &str = "acme.com/edge/E1/2";
const REGISTRY: &str = "Registry/acme.com/registry/R1/9";

#[derive(Default)]
struct MemoryTransport {
    published: Mutex<Vec<(Instant, String, Vec<u8>)>>,
    handlers: Mutex<Vec<(String, MessageHandler)>>,
}

impl Transport for MemoryTransport {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.published
            .lock()
            .unwrap()
            .push((Instant::now(), topic.to_string(), payload.clone()));
        self.deliver(topic, &payload);
        Ok(())
    }

    fn subscribe(&self, filter: &str, _qos: QoS, handler: MessageHandler) -> Result<(), TransportError> {
        self.handlers
            .lock()
            .unwrap()
            .push((filter.to_string(), handler));
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.handlers.lock().unwrap().retain(|(f, _)| f != filter);
        Ok(())
    }
}

impl MemoryTransport {
    fn deliver(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(topic, payload);
        }
    }

    fn request(&self, topic: &str, filter: Option<&str>) {
        let mut message = json!({
            "MessageId": "1700000000000-Registry/acme.com/registry/R1/9",
            "MessageType": "ua-data",
            "PublisherId": REGISTRY,
            "Messages": [],
        });
        if let Some(filter) = filter {
            message["Messages"] = json!([{"DataSetWriterId": 0, "Source": "", "Filter": filter, "Payload": null}]);
        }
        self.deliver(topic, &serde_json::to_vec(&message).unwrap());
    }

    fn filters(&self) -> Vec<String> {
        self.handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(filter, _)| filter.clone())
            .collect()
    }

    fn clear(&self) {
        self.published.lock().unwrap().clear();
    }

    fn messages(&self) -> Vec<(String, NetworkMessage)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, topic, payload)| (topic.clone(), NetworkMessage::from_json(payload).unwrap()))
            .collect()
    }

    fn on_topic(&self, topic: &str) -> Vec<NetworkMessage> {
        self.messages()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, message)| message)
            .collect()
    }

    fn times_on_topic(&self, topic: &str) -> Vec<Instant> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t, _)| t == topic)
            .map(|(at, _, _)| *at)
            .collect()
    }
}

fn mam(serial: &str) -> MasterAssetModel {
    MasterAssetModel {
        manufacturer_uri: "acme.com".into(),
        model: LocalizedText::new("en-US", "edge"),
        product_code: "E1".into(),
        serial_number: serial.into(),
        ..MasterAssetModel::default()
    }
}

fn application(config: ApplicationConfig) -> Arc<Application> {
    Application::new(
        ServiceType::Utility,
        ApplicationSource::new(mam("1"))
            .with_license_text("en", "MIT License")
            .with_license_text("de", "MIT-Lizenz"),
        config,
    )
    .unwrap()
}

fn started(config: ApplicationConfig) -> (Arc<Application>, Arc<MemoryTransport>) {
    let app = application(config);
    let transport = Arc::new(MemoryTransport::default());
    assert_ok!(app.start(transport.clone()));
    (app, transport)
}

fn get(resource: &str, source: Option<&str>) -> String {
    match source {
        Some(source) => format!("Oi4/Utility/{APP}/Get/{resource}/{source}"),
        None => format!("Oi4/Utility/{APP}/Get/{resource}"),
    }
}

fn published(resource: &str, source: &str) -> String {
    format!("Oi4/Utility/{APP}/Pub/{resource}/{source}")
}

type Received = Arc<Mutex<Vec<(Topic, NetworkMessage)>>>;

fn collector() -> (SubscriptionHandler, Received) {
    let received: Received = Arc::default();
    let sink = Arc::clone(&received);
    let handler: SubscriptionHandler = Arc::new(move |topic: &Topic, message: &NetworkMessage| {
        sink.lock().unwrap().push((topic.clone(), message.clone()));
    });
    (handler, received)
}

#[tokio::test]
async fn start_subscribes_and_announces_mam() {
    let (app, transport) = started(ApplicationConfig::default());

    let handlers = transport.handlers.lock().unwrap();
    assert_eq!(handlers.len(), 1);
    assert_eq!(handlers[0].0, format!("Oi4/Utility/{APP}/Get/#"));
    drop(handlers);

    let mam = transport.on_topic(&published("MAM", APP));
    assert_eq!(mam.len(), 1);
    assert_eq!(mam[0].publisher_id, format!("Utility/{APP}"));
    assert_eq!(mam[0].publisher_id, app.publisher_id());
    assert_eq!(mam[0].messages[0].payload["SerialNumber"], "1");
    assert!(mam[0].data_set_class_id.is_some());

    app.stop();
}

#[tokio::test]
async fn license_texts_are_independent() {
    let (app, transport) = started(ApplicationConfig::default());
    transport.clear();

    transport.request(&get("LicenseText", Some(APP)), Some("de"));

    let messages = transport.messages();
    assert_eq!(messages.len(), 1);
    let (topic, message) = &messages[0];
    assert_eq!(topic, &format!("{}/de", published("LicenseText", APP)));
    assert_eq!(
        message.correlation_id.as_deref(),
        Some("1700000000000-Registry/acme.com/registry/R1/9")
    );
    assert_eq!(message.first_filter(), Some("de"));
    assert_eq!(message.messages[0].payload, json!({"LicenseText": "MIT-Lizenz"}));

    let en = app
        .publication(ResourceType::LicenseText, Some(&Filter::new("en")))
        .unwrap();
    let de = app
        .publication(ResourceType::LicenseText, Some(&Filter::new("de")))
        .unwrap();
    assert_ne!(en.id(), de.id());
    assert_eq!(en.writer_id(), de.writer_id());

    transport.clear();
    transport.request(&get("LicenseText", None), None);
    let topics: Vec<_> = transport.messages().into_iter().map(|(topic, _)| topic).collect();
    assert_eq!(topics.len(), 2);
    assert!(topics.contains(&format!("{}/en", published("LicenseText", APP))));
    assert!(topics.contains(&format!("{}/de", published("LicenseText", APP))));

    app.stop();
}

#[tokio::test]
async fn get_without_source_covers_assets() {
    let (app, transport) = started(ApplicationConfig::default());
    app.register_asset(
        AssetSource::new(mam("2")).with_reference_designation(ReferenceDesignation::default()),
    )
    .unwrap();
    assert_eq!(transport.on_topic(&published("MAM", ASSET)).len(), 1);
    transport.clear();

    transport.request(&get("Health", None), None);
    assert_eq!(transport.on_topic(&published("Health", APP)).len(), 1);
    assert_eq!(transport.on_topic(&published("Health", ASSET)).len(), 1);

    transport.clear();
    transport.request(&get("ReferenceDesignation", Some(ASSET)), None);
    assert_eq!(transport.on_topic(&published("ReferenceDesignation", ASSET)).len(), 1);
    assert!(transport.on_topic(&published("ReferenceDesignation", APP)).is_empty());

    app.stop();
}

#[tokio::test]
async fn publication_list_answers_registered_publications() {
    let (app, transport) = started(ApplicationConfig::default());
    transport.clear();

    transport.request(&get("PublicationList", Some(APP)), None);

    let messages = transport.on_topic(&published("PublicationList", APP));
    assert_eq!(messages.len(), 1);
    let entries = &messages[0].messages;
    assert_eq!(entries.len(), app.publications().len());
    assert!(entries
        .iter()
        .any(|m| m.payload["Resource"] == "Health" && m.payload["Interval"] == 60_000));

    app.stop();
}

#[tokio::test]
async fn own_and_malformed_messages_are_skipped() {
    let (app, transport) = started(ApplicationConfig::default());
    transport.clear();

    let own = json!({
        "MessageId": "1-own",
        "MessageType": "ua-data",
        "PublisherId": app.publisher_id(),
        "Messages": [],
    });
    transport.deliver(&get("MAM", Some(APP)), &serde_json::to_vec(&own).unwrap());
    transport.deliver(&get("MAM", Some(APP)), b"not json");
    transport.deliver(&format!("Oi4/Utility/{APP}/Get/Unknown"), b"{}");
    transport.deliver(&format!("Oi4/Utility/{APP}/Set/MAM/{APP}"), b"{}");

    assert!(transport.messages().is_empty());
    app.stop();
}

#[tokio::test]
async fn source_updates_publish_immediately() {
    let (app, transport) = started(ApplicationConfig::default());
    app.register_publication(PublicationConfig::resource_with_filter(ResourceType::Data, "temp"))
        .unwrap();
    transport.clear();

    app.update_health(Health::new(HealthState::MaintenanceRequired, 60));
    let health = transport.on_topic(&published("Health", APP));
    assert_eq!(health.len(), 1);
    assert_eq!(
        health[0].messages[0].payload,
        json!({"Health": "MAINTENANCE_REQUIRED_4", "HealthScore": 60})
    );

    app.source().update_data(json!({"value": 21.5}), Filter::new("temp"));
    let data = transport.on_topic(&format!("{}/temp", published("Data", APP)));
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].messages[0].payload["value"], 21.5);

    app.stop();
}

#[tokio::test]
async fn same_filter_replaces_publication() {
    let (app, transport) = started(ApplicationConfig::default());

    let first = app
        .register_publication(PublicationConfig::resource_with_filter(ResourceType::Data, "temp"))
        .unwrap();
    let second = app
        .register_publication(
            PublicationConfig::resource_with_filter(ResourceType::Data, "temp")
                .with_status(StatusCode::UNCERTAIN),
        )
        .unwrap();
    app.register_publication(PublicationConfig::resource_with_filter(ResourceType::Data, "pressure"))
        .unwrap();

    assert!(!first.is_started());
    assert!(second.is_started());
    assert_eq!(
        app.publication(ResourceType::Data, Some(&Filter::new("temp")))
            .unwrap()
            .id(),
        second.id()
    );
    assert_eq!(
        app.publications()
            .iter()
            .filter(|p| p.resource() == ResourceType::Data)
            .count(),
        2
    );

    assert!(!transport.messages().is_empty());
    app.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_fires_on_interval() {
    let (app, transport) = started(ApplicationConfig {
        health_interval: Duration::from_millis(100),
        ..ApplicationConfig::default()
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    app.stop();

    let mut times = transport.times_on_topic(&published("Health", APP));
    // the final entry is the shutdown message
    times.pop();
    assert!(!times.is_empty());
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(100));
    }
}

#[tokio::test]
async fn stop_sends_graceful_health_once() {
    let (app, transport) = started(ApplicationConfig::default());
    transport.clear();

    app.stop();
    app.stop();

    let messages = transport.messages();
    assert_eq!(messages.len(), 1);
    let (topic, message) = &messages[0];
    assert_eq!(topic, &published("Health", APP));
    assert_eq!(message.messages[0].status, Some(StatusCode::GOOD));
    assert_eq!(
        message.messages[0].payload,
        json!({"Health": "NORMAL_0", "HealthScore": 0})
    );

    transport.clear();
    transport.request(&get("MAM", Some(APP)), None);
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn restart_subscribes_once() {
    let (app, transport) = started(ApplicationConfig::default());
    app.stop();
    assert!(transport.filters().is_empty());

    assert_ok!(app.start(transport.clone()));
    assert_eq!(transport.filters(), vec![format!("Oi4/Utility/{APP}/Get/#")]);
    app.stop();
}

#[test]
fn failed_start_undoes_subscriptions() {
    let app = application(ApplicationConfig::default());
    let (handler, _) = collector();
    app.register_subscription(Subscription::new("Oi4/Registry/#", handler))
        .unwrap();
    let transport = Arc::new(MemoryTransport::default());

    // no tokio runtime, so the scheduler cannot start
    let result = app.start(transport.clone());

    assert!(matches!(
        result,
        Err(ApplicationError::Scheduler(SchedulerError::NoRuntime))
    ));
    assert!(!app.is_started());
    assert!(transport.filters().is_empty());
    assert!(transport.messages().is_empty());
}

#[tokio::test]
async fn config_and_runtime_license_are_answered_once_set() {
    let mut config = serde_json::Map::new();
    config.insert("SampleRate".into(), json!(10));
    let mut rt_license = serde_json::Map::new();
    rt_license.insert("Seats".into(), json!(5));

    let app = Application::new(
        ServiceType::Utility,
        ApplicationSource::new(mam("1"))
            .with_config(PublishConfig(config))
            .with_rt_license(RtLicense(rt_license)),
        ApplicationConfig::default(),
    )
    .unwrap();
    let transport = Arc::new(MemoryTransport::default());
    assert_ok!(app.start(transport.clone()));
    transport.clear();

    transport.request(&get("Config", Some(APP)), None);
    transport.request(&get("RtLicense", Some(APP)), None);
    transport.request(&get("Profile", Some(APP)), None);

    let config = transport.on_topic(&published("Config", APP));
    assert_eq!(config.len(), 1);
    assert_eq!(config[0].messages[0].payload, json!({"SampleRate": 10}));
    let rt_license = transport.on_topic(&published("RtLicense", APP));
    assert_eq!(rt_license.len(), 1);
    assert_eq!(rt_license[0].messages[0].payload, json!({"Seats": 5}));

    let profile = &transport.on_topic(&published("Profile", APP))[0].messages[0].payload;
    let resources = profile["Resources"].as_array().unwrap();
    assert!(resources.contains(&json!("Config")));
    assert!(resources.contains(&json!("RtLicense")));
    assert!(resources.contains(&json!("SubscriptionList")));

    app.stop();
}

#[tokio::test]
async fn subscription_list_follows_registrations() {
    let (app, transport) = started(ApplicationConfig::default());
    transport.clear();

    let (handler, _) = collector();
    app.register_subscription(
        Subscription::new("Oi4/Registry/#", handler).with_interval(Duration::from_secs(1)),
    )
    .unwrap();
    assert!(transport.filters().contains(&"Oi4/Registry/#".to_string()));

    let announced = transport.on_topic(&published("SubscriptionList", APP));
    assert_eq!(announced.len(), 1);
    assert_eq!(
        announced[0].messages[0].payload,
        json!({"TopicPath": "Oi4/Registry/#", "Interval": 1000, "Config": "CONF_1"})
    );

    transport.clear();
    transport.request(&get("SubscriptionList", Some(APP)), None);
    let answered = transport.on_topic(&published("SubscriptionList", APP));
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0].messages.len(), 1);

    assert!(app.remove_subscription("Oi4/Registry/#").is_some());
    assert!(!transport.filters().contains(&"Oi4/Registry/#".to_string()));
    assert!(app.subscriptions().is_empty());

    app.stop();
}

#[tokio::test]
async fn subscriptions_skip_own_messages() {
    let (app, transport) = started(ApplicationConfig::default());
    let (skipping, skipped) = collector();
    let (keeping, kept) = collector();
    app.register_subscription(Subscription::new(
        format!("Oi4/Utility/{APP}/Pub/Health/#"),
        skipping,
    ))
    .unwrap();
    app.register_subscription(
        Subscription::new(format!("Oi4/Utility/{APP}/Pub/Health/{APP}"), keeping)
            .with_skip_own_messages(false),
    )
    .unwrap();

    app.update_health(Health::new(HealthState::Normal, 90));
    assert!(skipped.lock().unwrap().is_empty());
    assert_eq!(kept.lock().unwrap().len(), 1);

    let foreign = json!({
        "MessageId": "2-registry",
        "MessageType": "ua-data",
        "PublisherId": REGISTRY,
        "Messages": [],
    });
    transport.deliver(&published("Health", APP), &serde_json::to_vec(&foreign).unwrap());
    transport.deliver(&published("Health", APP), b"not json");
    // a foreign publisher on our own Pub topic is still ours
    assert!(skipped.lock().unwrap().is_empty());
    assert_eq!(kept.lock().unwrap().len(), 2);

    app.stop();
}

#[tokio::test]
async fn get_request_is_answered_by_other_application() {
    let (server, transport) = started(ApplicationConfig::default());
    let client = Application::new(
        ServiceType::Registry,
        ApplicationSource::new(mam("3")),
        ApplicationConfig::default(),
    )
    .unwrap();
    assert_ok!(client.start(transport.clone()));

    let (handler, answers) = collector();
    client
        .register_subscription(Subscription::new(
            format!("Oi4/Utility/{APP}/Pub/LicenseText/#"),
            handler,
        ))
        .unwrap();

    let topic = Topic::parse(&get("LicenseText", Some(APP))).unwrap();
    let message_id = client.send_get(&topic, Some(&Filter::new("de"))).unwrap();

    let answers = answers.lock().unwrap();
    assert_eq!(answers.len(), 1);
    let (answer_topic, answer) = &answers[0];
    assert_eq!(answer_topic.method, MethodType::Pub);
    assert_eq!(answer.correlation_id.as_deref(), Some(message_id.as_str()));
    assert_eq!(answer.publisher_id, server.publisher_id());
    assert_eq!(answer.messages[0].payload, json!({"LicenseText": "MIT-Lizenz"}));
    drop(answers);

    let pub_topic = Topic::parse(&published("MAM", APP)).unwrap();
    assert!(matches!(
        client.send_get(&pub_topic, None),
        Err(ApplicationError::NotAGetRequest(MethodType::Pub))
    ));

    client.stop();
    assert!(matches!(
        client.send_get(&topic, None),
        Err(ApplicationError::NotStarted)
    ));
    server.stop();
}

#[tokio::test]
async fn filter_without_source_stays_in_payload() {
    let (app, transport) = started(ApplicationConfig::default());
    app.register_publication(
        PublicationConfig::resource_with_filter(ResourceType::Data, "temp")
            .with_addressing(Addressing::ApplicationFilter),
    )
    .unwrap();
    transport.clear();

    app.source().update_data(json!({"value": 3}), Filter::new("temp"));

    let data = transport.on_topic(&format!("Oi4/Utility/{APP}/Pub/Data"));
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].first_filter(), Some("temp"));
    app.stop();
}
