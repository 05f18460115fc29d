use crate::catalog::products;
use crate::catalog::CatalogContext;
use crate::catalog::FIRST_PRODUCT_ID;
use crate::catalog::PRODUCT_TYPE;
use crate::Check;
use crate::Expectation;
use crate::Scenario;
use crate::Stimulus;
use fiware_api::EntityPattern;
use fiware_api::Notification;
use fiware_api::Subject;
use fiware_api::Subscription;
use serde_json::json;

pub const PRICE_SUBSCRIPTION: &str = "Notify QuantumLeap of all price changes";

/// Price changes of any product are notified to QuantumLeap
pub fn price_changes_to_time_series(context: &CatalogContext) -> Subscription {
    Subscription::new(
        Subject::new(vec![EntityPattern::id_pattern(".*").with_type(PRODUCT_TYPE)])
            .on_change_of(vec!["price".to_string()]),
        Notification::http(&context.ql_notify_url)
            .with_attrs(vec!["price".to_string()])
            .with_metadata(vec!["dateCreated".to_string(), "dateModified".to_string()]),
    )
    .with_description(PRICE_SUBSCRIPTION)
}

/// An attribute update recorded as a time series by QuantumLeap
pub fn time_series_notification(context: &CatalogContext) -> Scenario {
    products()
        .into_iter()
        .fold(Scenario::new("time series notification"), Scenario::with_entity)
        .with_subscription(price_changes_to_time_series(context))
        .step(
            Stimulus::UpdateAttributeValue {
                entity_id: FIRST_PRODUCT_ID.to_string(),
                entity_type: Some(PRODUCT_TYPE.to_string()),
                attr: "price".to_string(),
                value: json!(66),
            },
            vec![Expectation::eventually(Check::TimeSeriesLength {
                entity_id: FIRST_PRODUCT_ID.to_string(),
                attr: "price".to_string(),
                last_n: Some(3),
                expected: 1,
            })],
        )
}
