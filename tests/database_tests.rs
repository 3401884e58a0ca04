use serial_test::serial;
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use travelplan::cache::TripSignature;
use travelplan::db::{
    CachedItinerary, ItineraryRepository, LocationRepository, PgItineraryRepository,
    PgLocationRepository,
};
use travelplan::models::{BoundingBox, BudgetLevel, Coordinates, Plan};

mod common;

use common::location;

#[tokio::test]
#[ignore]
#[serial]
async fn test_nearby_finds_small_place_among_large_ones() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_db(&pool).await;
    let repo = PgLocationRepository::new(pool);

    // Inside the prefilter box but outside the 20 km circle, and more populous
    for i in 0..60 {
        let mut town = location(&format!("Corner Town {}", i), 45.17, 5.24, None);
        town.population = Some(1_000_000 + i);
        repo.insert(&town).await.unwrap();
    }
    let mut hamlet = location("Le Hameau", 45.005, 5.0, None);
    hamlet.population = Some(10);
    repo.insert(&hamlet).await.unwrap();

    let center = Coordinates::new(45.0, 5.0).unwrap();
    let found = repo.find_nearby(&center, 20.0, 1).await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].slug, "le-hameau");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_bbox_across_antimeridian() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_db(&pool).await;
    let repo = PgLocationRepository::new(pool);

    repo.insert(&location("Taveuni", -16.9, 179.95, None)).await.unwrap();
    repo.insert(&location("Lau", -17.0, -179.9, None)).await.unwrap();
    repo.insert(&location("Yasawa", -17.0, 177.4, None)).await.unwrap();

    let bbox = BoundingBox::around(&[Coordinates::new(-17.0, 179.9).unwrap()], 50.0).unwrap();
    assert!(bbox.crosses_antimeridian());

    let mut slugs: Vec<String> = repo
        .find_in_bbox(&bbox, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.slug)
        .collect();
    slugs.sort();

    assert_eq!(slugs, vec!["lau", "taveuni"]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_resaving_expired_key_keeps_row_id() {
    let pool = common::setup_test_db().await;
    common::cleanup_test_db(&pool).await;
    let repo = PgItineraryRepository::new(pool);

    let signature = TripSignature::new("paris", "lyon", &[], 3, &[], BudgetLevel::Moderate);
    let plan = Plan::new(vec![], "Paris to Lyon".to_string(), vec![], HashMap::new(), None);
    let long_ago = OffsetDateTime::now_utc() - Duration::days(60);
    let expired = CachedItinerary::new(signature.clone(), plan.clone(), None, long_ago, 30);
    let stored_id = repo.save(&expired).await.unwrap();
    assert_eq!(stored_id, expired.id);

    let fresh = CachedItinerary::new(signature, plan, None, OffsetDateTime::now_utc(), 30);
    let id = repo.save(&fresh).await.unwrap();
    assert_eq!(id, stored_id);

    repo.record_usage(id).await.unwrap();
    let found = repo.find_by_key(&fresh.cache_key).await.unwrap().unwrap();
    assert_eq!(found.id, stored_id);
    assert_eq!(found.usage_count, 1);
}
