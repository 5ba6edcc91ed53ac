use docmap::{
    bson::{Document, doc},
    memory::InMemoryStore,
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
struct HelloWorld {
    #[record(id)]
    #[serde(rename = "_id")]
    id: ObjectId,
    #[record(slug)]
    name: String,
    value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Record)]
struct Hello {
    #[record(inline)]
    #[serde(flatten)]
    world: HelloWorld,
    greeting: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Record)]
struct Counter {
    #[record(id)]
    #[serde(rename = "_id")]
    id: ObjectId,
    count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Record)]
struct TitledCounter {
    #[record(inline)]
    #[serde(flatten)]
    counter: Counter,
    #[record(slug)]
    title: String,
}

#[derive(Debug, Default, Serialize)]
struct Pattern {
    name: Option<String>,
    value: Option<String>,
}

#[derive(Debug, PartialEq, Deserialize)]
struct ValueCount {
    #[serde(rename = "_id")]
    value: String,
    count: i64,
}

fn world(name: &str, value: &str) -> HelloWorld {
    HelloWorld {
        id: ObjectId::default(),
        name: name.to_string(),
        value: value.to_string(),
    }
}

async fn client() -> DocumentClient<InMemoryStore> {
    DocumentClient::connected(InMemoryStore::builder(), "testCollection")
        .await
        .unwrap()
}

async fn seeded() -> DocumentClient<InMemoryStore> {
    let client = client().await;

    for (name, value) in [("world", "Hello"), ("moon", "Hello"), ("sun", "Bye")] {
        client.insert(&mut world(name, value)).await.unwrap();
    }

    client
}

#[tokio::test]
async fn insert_then_read_by_id_and_slug() {
    let client = client().await;
    let mut record = world("world", "Hello");

    let id = client.insert(&mut record).await.unwrap();

    assert!(id.is_valid());
    assert_eq!(record.id, id);

    let by_id: HelloWorld = client.read_by_id(&id.to_hex()).await.unwrap();
    let by_slug: HelloWorld = client.read_by_slug("world").await.unwrap();
    let by_id_text: HelloWorld = client.read_by_slug(&id.to_hex()).await.unwrap();

    assert_eq!(by_id, record);
    assert_eq!(by_slug, record);
    assert_eq!(by_id_text, record);
}

#[tokio::test]
async fn find_delete_then_read_is_not_found() {
    let client = client().await;
    client.insert(&mut world("world", "Hello")).await.unwrap();

    let found: Vec<HelloWorld> = client
        .find_by_value(&doc! { "name": "world", "value": "Hello" })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let id = found[0].id.to_hex();
    assert_eq!(client.delete_by_id(&id).await.unwrap(), 1);

    assert!(client.read_by_id::<HelloWorld>(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn inline_record_stores_flat_document() {
    let client = client().await;
    let mut record = Hello {
        world: world("world", "Hello"),
        greeting: "hi".to_string(),
    };

    let id = client.insert(&mut record).await.unwrap();
    assert_eq!(record.world.id, id);

    let raw: Vec<Document> = client
        .find_grouped(&doc! { "greeting": "hi" }, doc! { "_id": "$_id", "name": { "$first": "$name" } }, doc! {})
        .await
        .unwrap();
    assert_eq!(raw, vec![doc! { "_id": id.as_oid().unwrap(), "name": "world" }]);

    let by_slug: Hello = client.read_by_slug("world").await.unwrap();
    assert_eq!(by_slug, record);
}

#[tokio::test]
async fn unknown_slug_is_not_found() {
    let client = seeded().await;

    let err = client.read_by_slug::<HelloWorld>("mars").await.unwrap_err();
    assert!(err.is_not_found());

    let err = client
        .read_by_id::<HelloWorld>(&ObjectId::generate().to_hex())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn malformed_identifier_is_rejected() {
    let client = seeded().await;

    assert!(matches!(
        client.read_by_id::<HelloWorld>("world").await,
        Err(DocumentStoreError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        client.delete_by_id("zz").await,
        Err(DocumentStoreError::InvalidIdentifier(_))
    ));
}

#[tokio::test]
async fn slug_lookup_requires_slug_field() {
    let client = client().await;
    client.insert(&mut Counter { count: 1, ..Default::default() }).await.unwrap();

    assert!(matches!(
        client.read_by_slug::<Counter>("one").await,
        Err(DocumentStoreError::Configuration(_))
    ));
}

#[tokio::test]
async fn direct_slug_beside_slugless_inline_member() {
    let client = client().await;
    let mut record = TitledCounter {
        counter: Counter { count: 7, ..Default::default() },
        title: "seven".to_string(),
    };

    let id = client.insert(&mut record).await.unwrap();
    assert_eq!(record.counter.id, id);
    assert_eq!(TitledCounter::SLUG_FIELD, Some("title"));

    let found: TitledCounter = client.read_by_slug("seven").await.unwrap();
    assert_eq!(found.counter.count, 7);
}

#[tokio::test]
async fn delete_by_slug_removes_one_document() {
    let client = seeded().await;
    client.insert(&mut world("world", "Again")).await.unwrap();

    assert_eq!(client.delete_by_slug::<HelloWorld>("world").await.unwrap(), 1);
    assert_eq!(client.find_by_value::<HelloWorld, _>(&doc! { "name": "world" }).await.unwrap().len(), 1);
    assert_eq!(client.delete_by_slug::<HelloWorld>("mars").await.unwrap(), 0);
}

#[tokio::test]
async fn delete_by_id_removes_document() {
    let client = client().await;
    let id = client.insert(&mut world("world", "Hello")).await.unwrap();

    assert_eq!(client.delete_by_id(&id.to_hex()).await.unwrap(), 1);
    assert_eq!(client.delete_by_id(&id.to_hex()).await.unwrap(), 0);
    assert!(client.find_all::<HelloWorld>().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_replaces_stored_document() {
    let client = client().await;
    let mut record = world("world", "Hello");
    client.insert(&mut record).await.unwrap();

    record.value = "Bye".to_string();
    client.update(&record).await.unwrap();

    let stored: HelloWorld = client.read_by_id(&record.id.to_hex()).await.unwrap();
    assert_eq!(stored.value, "Bye");
}

#[tokio::test]
async fn update_never_inserts() {
    let client = seeded().await;

    let unsaved = HelloWorld { id: ObjectId::generate(), ..world("mars", "Hello") };
    assert!(client.update(&unsaved).await.unwrap_err().is_not_found());

    assert!(matches!(
        client.update(&world("mars", "Hello")).await,
        Err(DocumentStoreError::MissingIdentifier(_))
    ));
    assert_eq!(client.find_all::<HelloWorld>().await.unwrap().len(), 3);
}

#[tokio::test]
async fn update_filtered_keeps_identifier() {
    let client = seeded().await;
    let before: HelloWorld = client.read_by_slug("sun").await.unwrap();

    client
        .update_filtered(doc! { "name": "sun" }, &world("sun", "Hello"))
        .await
        .unwrap();

    let after: HelloWorld = client.read_by_slug("sun").await.unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.value, "Hello");

    assert!(client
        .update_filtered(doc! { "name": "mars" }, &world("mars", "Hello"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn duplicate_insert_is_rejected() {
    let client = client().await;
    let mut record = world("world", "Hello");
    client.insert(&mut record).await.unwrap();

    assert!(matches!(
        client.insert(&mut record).await,
        Err(DocumentStoreError::DocumentAlreadyExists(..))
    ));
}

#[tokio::test]
async fn pattern_ignores_unset_fields() {
    let client = seeded().await;

    let hellos: Vec<HelloWorld> = client
        .find_by_value(&Pattern { value: Some("Hello".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(hellos.len(), 2);

    let single: HelloWorld = client
        .read_by_value(&Pattern { name: Some("sun".into()), value: Some("Bye".into()) })
        .await
        .unwrap();
    assert_eq!(single.name, "sun");

    let everything: Vec<HelloWorld> = client.find_by_value(&Pattern::default()).await.unwrap();
    assert_eq!(everything.len(), 3);
}

#[tokio::test]
async fn sorted_find_orders_by_keys() {
    let client = seeded().await;

    let records: Vec<HelloWorld> = client
        .find_by_value_sorted(&doc! {}, ["-value", "name"])
        .await
        .unwrap();

    let names = records
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>();

    assert_eq!(names, vec!["moon", "world", "sun"]);
}

#[tokio::test]
async fn filter_expressions_compile_to_store_filters() {
    let client = seeded().await;
    let filter = Filter::eq("value", "Hello")
        .and(Filter::starts_with("name", "w"))
        .to_document()
        .unwrap();

    let records: Vec<HelloWorld> = client.find_by_filter(filter.clone()).await.unwrap();
    assert_eq!(records.len(), 1);

    let record: HelloWorld = client.read_by_filter(filter).await.unwrap();
    assert_eq!(record.name, "world");
}

#[tokio::test]
async fn grouped_counts_by_value() {
    let client = seeded().await;

    let counts: Vec<ValueCount> = client
        .find_grouped(
            &Pattern::default(),
            doc! { "_id": "$value", "count": { "$sum": 1 } },
            doc! { "_id": 1 },
        )
        .await
        .unwrap();

    assert_eq!(counts, vec![
        ValueCount { value: "Bye".into(), count: 1 },
        ValueCount { value: "Hello".into(), count: 2 },
    ]);
}

#[tokio::test]
async fn redacted_keeps_matching_documents() {
    let client = seeded().await;

    let records: Vec<HelloWorld> = client
        .find_redacted(&doc! {}, doc! { "$eq": ["$value", "Hello"] }, doc! { "name": -1 })
        .await
        .unwrap();

    let names = records
        .iter()
        .map(|r| r.name.as_str())
        .collect::<Vec<_>>();

    assert_eq!(names, vec!["world", "moon"]);
}

#[tokio::test]
async fn create_collection_if_absent_is_idempotent() {
    let client = client().await;

    assert!(client.create_collection_if_absent().await.unwrap());
    assert!(!client.create_collection_if_absent().await.unwrap());

    client.drop_collection().await.unwrap();
    assert!(matches!(
        client.drop_collection().await,
        Err(DocumentStoreError::CollectionNotFound(_))
    ));
}

#[tokio::test]
async fn clients_share_a_seeded_store() {
    let store = InMemoryStore::new();
    let writer = DocumentClient::connected(InMemoryStore::builder().with_store(store.clone()), "testCollection")
        .await
        .unwrap();
    let reader = DocumentClient::connected(InMemoryStore::builder().with_store(store), "testCollection")
        .await
        .unwrap();

    let id = writer.insert(&mut world("world", "Hello")).await.unwrap();
    let found: HelloWorld = reader.read_by_id(&id.to_hex()).await.unwrap();

    assert_eq!(found.name, "world");
}

#[tokio::test]
async fn closed_client_rejects_operations() {
    let mut client = seeded().await;

    client.close().await.unwrap();

    assert_eq!(client.status(), ClientStatus::Closed);
    assert!(matches!(
        client.find_all::<HelloWorld>().await,
        Err(DocumentStoreError::InvalidState(_))
    ));
}

#[tokio::test]
async fn connect_from_config() {
    let config = ClientConfig::from_json(
        r#"{ "url": "memory://", "database": "local", "collection": "testCollection" }"#,
    )
    .unwrap();

    let mut client = DocumentClient::new();
    client.connect(InMemoryStore::builder(), &config.collection).await.unwrap();

    assert_eq!(client.collection_name(), Some("testCollection"));
    client.close().await.unwrap();
}
