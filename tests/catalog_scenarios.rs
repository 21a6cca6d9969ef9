use chrono::Utc;
use pricebook::config::CatalogConfig;
use pricebook::price::DEFAULT_PRICE_TYPE;
use pricebook::{
    BidMonth, CatalogStore, Error, NewPriceMeta, NewProduct, NewQuote, PriceHistoryMode,
    PriceWrite, Violation,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn temp_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("catalog.db");
    (dir, path)
}

#[test]
fn duplicate_normalized_name_is_a_uniqueness_violation() {
    let store = CatalogStore::open_in_memory().unwrap();

    let rod = store
        .create_product(&NewProduct::new("Steel Rod 10mm", "steel_rod_10mm"))
        .expect("first insert");
    assert_eq!(rod.id, 1);

    let err = store
        .create_product(&NewProduct::new("Steel rod, 10 mm", "steel_rod_10mm"))
        .unwrap_err();
    assert_eq!(err.violation(), Some(Violation::Uniqueness));
}

#[test]
fn price_meta_reads_back_unchanged() {
    let store = CatalogStore::open_in_memory().unwrap();
    let rod = store
        .create_product(&NewProduct::new("Steel Rod 10mm", "steel_rod_10mm"))
        .unwrap();

    let new = NewPriceMeta::parse(rod.id, "2024-03", "Acme Corp")
        .unwrap()
        .with_price(120.5)
        .with_price_type(DEFAULT_PRICE_TYPE);
    let written = store.create_price_meta(&new).unwrap();
    assert!(matches!(written, PriceWrite::Inserted(_)));

    let read = store.get_price_meta(written.record().id).unwrap().expect("stored row");
    assert_eq!(read.product_id, 1);
    assert_eq!(read.bid_month.to_string(), "2024-03");
    assert_eq!(read.company, "Acme Corp");
    assert_eq!(read.price, Some(120.5));
    assert_eq!(read.price_type.as_deref(), Some("winning bid (default)"));
    assert!(read.id > 0);
}

#[test]
fn quote_for_missing_product_is_a_referential_violation() {
    let store = CatalogStore::open_in_memory().unwrap();

    let err = store.create_quote(&NewQuote::new(999)).unwrap_err();
    assert_eq!(err.violation(), Some(Violation::ReferentialIntegrity));
    assert!(matches!(err, Error::DanglingReference { product_id: 999, .. }));
}

#[test]
fn malformed_month_never_reaches_storage() {
    let err = NewPriceMeta::parse(1, "03/2024", "Acme Corp").unwrap_err();
    assert_eq!(err.violation(), Some(Violation::Format));
}

#[test]
fn out_of_range_year_never_reaches_storage() {
    let store = CatalogStore::open_in_memory().unwrap();
    let product = store.get_or_create_product("Steel Rod 10mm").unwrap();

    for raw in ["0000-03-15", "-0001-03-15"] {
        let err = BidMonth::parse_loose(raw).unwrap_err();
        assert_eq!(err.violation(), Some(Violation::Format), "{raw}");
    }
    let month = BidMonth::parse_loose("2024-03-15").unwrap();
    store
        .create_price_meta(&NewPriceMeta::new(product.id, month, "Acme Corp"))
        .unwrap();

    assert_eq!(store.count_price_meta().unwrap(), 1);
    assert_eq!(store.prices_for_product(product.id).unwrap().len(), 1);
}

#[test]
fn created_at_is_assigned_by_the_database() {
    let store = CatalogStore::open_in_memory().unwrap();
    let before = Utc::now().naive_utc() - chrono::Duration::seconds(5);

    let product = store.get_or_create_product("Copper Wire").unwrap();
    let quote = store.create_quote(&NewQuote::new(product.id)).unwrap();
    let month = BidMonth::current();
    let price = store
        .create_price_meta(&NewPriceMeta::new(product.id, month, "Beta Ltd"))
        .unwrap()
        .into_record();

    let after = Utc::now().naive_utc() + chrono::Duration::seconds(5);
    for created in [product.created_at, quote.created_at, price.created_at] {
        assert!(created >= before && created <= after, "{created}");
    }
    assert_eq!(price.price, None);
}

#[test]
fn file_catalog_survives_reopen() {
    let (_dir, path) = temp_db();

    let product_id = {
        let store = CatalogStore::open(&path).unwrap();
        let product = store.get_or_create_product("Steel Rod 10mm").unwrap();
        let new = NewPriceMeta::parse(product.id, "2024-03", "Acme Corp").unwrap();
        store.create_price_meta(&new.with_price(120.5)).unwrap();
        product.id
    };

    let store = CatalogStore::open(&path).unwrap();
    assert_eq!(store.get_product(product_id).unwrap().unwrap().name, "Steel Rod 10mm");
    assert_eq!(store.prices_for_product(product_id).unwrap().len(), 1);
    assert!(store.check_integrity().unwrap().is_clean());
}

#[test]
fn concurrent_writers_share_one_product_row() {
    let (_dir, path) = temp_db();
    CatalogStore::open(&path).unwrap();

    let ids: Vec<i64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let store = CatalogStore::open(&path).unwrap();
                    store.get_or_create_product("Galvanized Bolt M8").unwrap().id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    let store = CatalogStore::open(&path).unwrap();
    assert_eq!(store.count_products().unwrap(), 1);
}

#[test]
fn switching_history_mode_on_reopen() {
    let (_dir, path) = temp_db();
    let latest = CatalogConfig {
        price_history: PriceHistoryMode::KeepLatest,
        ..CatalogConfig::default()
    };

    let product_id = {
        let store = CatalogStore::open_with(&path, &latest).unwrap();
        let product = store.get_or_create_product("Steel Rod 10mm").unwrap();
        let new = NewPriceMeta::parse(product.id, "2024-03", "Acme Corp").unwrap();
        store.create_price_meta(&new.clone().with_price(1.0)).unwrap();
        store.create_price_meta(&new.with_price(2.0)).unwrap();
        assert_eq!(store.prices_for_product(product.id).unwrap().len(), 1);
        product.id
    };

    // Append mode drops the unique index so history can accumulate again
    let store = CatalogStore::open(&path).unwrap();
    let new = NewPriceMeta::parse(product_id, "2024-03", "Acme Corp").unwrap().with_price(3.0);
    store.create_price_meta(&new).unwrap();

    let prices: Vec<_> = store
        .prices_for_product(product_id)
        .unwrap()
        .into_iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, [Some(2.0), Some(3.0)]);
}

#[test]
fn unique_mode_refuses_a_file_with_duplicate_observations() {
    let (_dir, path) = temp_db();

    let product_id = {
        let store = CatalogStore::open(&path).unwrap();
        let product = store.get_or_create_product("Steel Rod 10mm").unwrap();
        let new = NewPriceMeta::parse(product.id, "2024-03", "Acme Corp").unwrap();
        store.create_price_meta(&new.clone().with_price(1.0)).unwrap();
        store.create_price_meta(&new.with_price(2.0)).unwrap();
        product.id
    };

    for mode in [PriceHistoryMode::KeepFirst, PriceHistoryMode::KeepLatest] {
        let config = CatalogConfig {
            price_history: mode,
            ..CatalogConfig::default()
        };
        assert!(CatalogStore::open_with(&path, &config).is_err(), "{mode}");
    }

    let store = CatalogStore::open(&path).unwrap();
    let prices: Vec<_> = store
        .prices_for_product(product_id)
        .unwrap()
        .into_iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, [Some(1.0), Some(2.0)]);
    assert_eq!(store.count_products().unwrap(), 1);
}
