//! End-to-end resolution flows over real HTTP clients (mockito) and an
//! in-memory local store.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use nutrifind::{
    FoodResolver, LocalStore, OpenFoodFactsClient, PrimaryClient, Product, Source,
};

const TOKEN_BODY: &str = r#"{"access_token": "test-token", "expires_in": 3600}"#;

fn local_product(name: &str, idx: u32) -> Product {
    Product {
        id: None,
        name: name.to_string(),
        brand: None,
        barcode: None,
        calories_per_100g: 120.0,
        protein_per_100g: 20.0,
        fats_per_100g: 3.0,
        carbs_per_100g: 1.0,
        source: Source::User,
        source_id: Some(format!("local-{idx}")),
        image_url: None,
    }
}

fn primary_client(server: &ServerGuard) -> Arc<PrimaryClient> {
    Arc::new(PrimaryClient::with_base_urls(
        format!("{}/server.api", server.url()),
        format!("{}/connect/token", server.url()),
        "id",
        "secret",
    ))
}

fn secondary_client(server: &ServerGuard) -> Arc<OpenFoodFactsClient> {
    Arc::new(OpenFoodFactsClient::with_base_url(
        server.url(),
        Duration::from_millis(5000),
    ))
}

async fn resolver(
    primary: &ServerGuard,
    secondary: &ServerGuard,
) -> FoodResolver {
    FoodResolver::builder()
        .store(LocalStore::in_memory().await.unwrap())
        .primary(primary_client(primary))
        .secondary(secondary_client(secondary))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn full_local_page_never_reaches_the_network() {
    let mut primary = Server::new_async().await;
    let mut secondary = Server::new_async().await;
    let primary_mock = primary.mock("POST", "/server.api").expect(0).create();
    let token_mock = primary.mock("POST", "/connect/token").expect(0).create();
    let secondary_mock = secondary.mock("GET", "/cgi/search.pl").expect(0).create();

    let resolver = resolver(&primary, &secondary).await;
    for i in 0..25 {
        resolver
            .store()
            .insert(&local_product(&format!("Chicken {i}"), i))
            .await
            .unwrap();
    }

    let results = resolver.resolve("chicken", 20).await;
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|p| p.source == Source::User));
    primary_mock.assert();
    token_mock.assert();
    secondary_mock.assert();
}

#[tokio::test]
async fn miss_everywhere_is_empty_not_an_error() {
    let mut primary = Server::new_async().await;
    let mut secondary = Server::new_async().await;
    let _token = primary
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create();
    let _primary = primary
        .mock("POST", "/server.api")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"foods": {}}"#)
        .create();
    let _secondary = secondary
        .mock("GET", "/cgi/search.pl")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"products": []}"#)
        .create();

    let resolver = resolver(&primary, &secondary).await;
    let results = resolver.resolve("xyz123notfound", 10).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn primary_outage_falls_back_to_secondary() {
    let mut primary = Server::new_async().await;
    let mut secondary = Server::new_async().await;
    let _token = primary
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create();
    // initial attempt plus two retries, then the orchestrator falls back
    let primary_mock = primary
        .mock("POST", "/server.api")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(3)
        .create();
    let secondary_mock = secondary
        .mock("GET", "/cgi/search.pl")
        .match_query(Matcher::UrlEncoded(
            "search_terms".to_string(),
            "cola".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"products": [{
                "code": "5449000000996",
                "product_name": "Coca-Cola",
                "brands": "Coca-Cola",
                "nutriments": {"energy-kcal_100g": 42, "carbohydrates_100g": 10.6}
            }]}"#,
        )
        .create();

    let resolver = resolver(&primary, &secondary).await;
    let results = resolver.resolve("cola", 10).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, Source::OpenFoodFacts);
    primary_mock.assert();
    secondary_mock.assert();
}

#[tokio::test]
async fn barcode_found_via_primary_is_tagged_and_written_back() {
    let mut primary = Server::new_async().await;
    let secondary = Server::new_async().await;
    let _token = primary
        .mock("POST", "/connect/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create();
    let _id = primary
        .mock("POST", "/server.api")
        .match_query(Matcher::UrlEncoded(
            "method".to_string(),
            "food.find_id_for_barcode".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"food_id": {"value": "33691"}}"#)
        .create();
    let _get = primary
        .mock("POST", "/server.api")
        .match_query(Matcher::UrlEncoded(
            "method".to_string(),
            "food.get".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"food": {
                "food_id": "33691",
                "food_name": "Coca-Cola",
                "servings": {"serving": [{
                    "metric_serving_amount": "100.000",
                    "metric_serving_unit": "ml",
                    "calories": "42",
                    "protein": "0",
                    "fat": "0",
                    "carbohydrate": "10.6"
                }]}
            }}"#,
        )
        .create();

    let resolver = resolver(&primary, &secondary).await;
    let product = resolver.resolve_by_barcode("5449000000996").await.unwrap();
    // the native response omits the barcode; the resolver tags it
    assert_eq!(product.barcode.as_deref(), Some("5449000000996"));
    assert_eq!(product.calories_per_100g, 42.0);

    // detached write-back lands shortly after the response
    let mut persisted = false;
    for _ in 0..100 {
        if resolver
            .store()
            .find_by_natural_key(Source::FatSecret, "33691")
            .await
            .unwrap()
            .is_some()
        {
            persisted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(persisted);
}
