use crate::Check;
use crate::Expectation;
use crate::Scenario;
use crate::Stimulus;
use fiware_api::ActionType;
use fiware_api::ContextAttribute;
use fiware_api::ContextEntity;
use fiware_api::EntityQuery;
use serde_json::json;
use serde_json::Value;

pub const FIRST_PRODUCT_ID: &str = "urn:ngsi-ld:Product:001";
pub const SECOND_PRODUCT_ID: &str = "urn:ngsi-ld:Product:002";
pub const THIRD_PRODUCT_ID: &str = "urn:ngsi-ld:Product:003";
pub const PRODUCT_TYPE: &str = "Product";

const TIME_INSTANT: &str = "2024-04-04T14:08:16.655Z";

/// Three products: apples, bananas and coconuts
pub fn products() -> Vec<ContextEntity> {
    vec![
        ContextEntity::new(FIRST_PRODUCT_ID, PRODUCT_TYPE)
            .with_attribute("name", "Text", "Apples")
            .with_attribute("offerPrice", "Integer", 89)
            .with_attribute("price", "Integer", 99)
            .with_attribute("size", "Text", "S")
            .with_attribute("specialOffer", "Boolean", true),
        ContextEntity::new(SECOND_PRODUCT_ID, PRODUCT_TYPE)
            .with_attribute("name", "Text", "Bananas")
            .with_attribute("price", "Integer", 1099)
            .with_attribute("size", "Text", "M"),
        ContextEntity::new(THIRD_PRODUCT_ID, PRODUCT_TYPE)
            .with_attribute("name", "Text", "Coconuts")
            .with_attribute("price", "Integer", 1499)
            .with_attribute("size", "Text", "M"),
    ]
}

fn first_product() -> ContextEntity {
    ContextEntity::new(FIRST_PRODUCT_ID, PRODUCT_TYPE)
}

fn value_of(attr: &str, expected: impl Into<Value>) -> Expectation {
    Expectation::eventually(
        Check::attribute_value(FIRST_PRODUCT_ID, attr, expected).of_type(PRODUCT_TYPE),
    )
}

fn type_of(attr: &str, expected_type: &str) -> Expectation {
    Expectation::eventually(
        Check::attribute_type(FIRST_PRODUCT_ID, attr, expected_type).of_type(PRODUCT_TYPE),
    )
}

fn absence_of(attr: &str) -> Expectation {
    Expectation::eventually(
        Check::attribute_absent(FIRST_PRODUCT_ID, attr).of_type(PRODUCT_TYPE),
    )
}

fn metadata_on(attr: &str) -> Expectation {
    Expectation::eventually(
        Check::attribute_metadata_present(FIRST_PRODUCT_ID, attr).of_type(PRODUCT_TYPE),
    )
}

/// Overwrite, retype, delete and add attributes of an entity, directly and by batch
pub fn entity_update_suite() -> Scenario {
    let scenario = products()
        .into_iter()
        .fold(Scenario::new("entity update suite"), Scenario::with_entity);

    let deleted_attributes = first_product()
        .with_attribute("price", "Integer", Value::Null)
        .with_attribute("name", "Text", Value::Null);

    let timestamped = |attr_type: &str, value: Value| {
        ContextAttribute::new(attr_type, value).with_metadata(
            "TimeInstant",
            "DateTime",
            TIME_INSTANT,
        )
    };
    let mut with_metadata = first_product();
    with_metadata
        .attributes
        .insert("name".to_string(), timestamped("Text", json!("Apples")));
    with_metadata
        .attributes
        .insert("price".to_string(), timestamped("Integer", json!(99)));

    scenario
        // overwrite a single attribute
        .step(
            Stimulus::UpdateAttributeValue {
                entity_id: FIRST_PRODUCT_ID.to_string(),
                entity_type: Some(PRODUCT_TYPE.to_string()),
                attr: "price".to_string(),
                value: json!(89),
            },
            vec![
                Expectation::eventually(Check::EntityCount {
                    query: EntityQuery::all().with_type(PRODUCT_TYPE),
                    expected: 3,
                }),
                value_of("price", 89),
            ],
        )
        // overwrite multiple attributes
        .step(
            Stimulus::PatchAttributes {
                entity: first_product()
                    .with_attribute("price", "Integer", 79)
                    .with_attribute("name", "Text", "Ale"),
            },
            vec![value_of("price", 79), value_of("name", "Ale")],
        )
        // overwrite the type of a single attribute
        .step(
            Stimulus::PatchAttributes {
                entity: first_product().with_attribute("price", "String", "79"),
            },
            vec![value_of("price", "79"), type_of("price", "String")],
        )
        // overwrite the type of multiple attributes
        .step(
            Stimulus::PatchAttributes {
                entity: first_product()
                    .with_attribute("price", "Number", 79)
                    .with_attribute("name", "String", "Ale"),
            },
            vec![
                value_of("price", 79),
                type_of("price", "Number"),
                value_of("name", "Ale"),
                type_of("name", "String"),
            ],
        )
        .step(
            Stimulus::DeleteAttribute {
                entity_id: FIRST_PRODUCT_ID.to_string(),
                entity_type: Some(PRODUCT_TYPE.to_string()),
                attr: "specialOffer".to_string(),
            },
            vec![absence_of("specialOffer")],
        )
        .step(
            Stimulus::BatchUpdate {
                action: ActionType::Delete,
                entities: vec![deleted_attributes],
            },
            vec![absence_of("price"), absence_of("name")],
        )
        // add a new attribute
        .step(
            Stimulus::AppendAttributes {
                entity: first_product().with_attribute("specialOffer", "Boolean", true),
            },
            vec![value_of("specialOffer", true), type_of("specialOffer", "Boolean")],
        )
        // the attributes deleted above can be created again
        .step(
            Stimulus::BatchUpdate {
                action: ActionType::AppendStrict,
                entities: vec![first_product()
                    .with_attribute("name", "Text", "Apples")
                    .with_attribute("price", "Integer", 99)],
            },
            vec![value_of("name", "Apples"), value_of("price", 99)],
        )
        .step(
            Stimulus::BatchUpdate {
                action: ActionType::Append,
                entities: vec![with_metadata],
            },
            vec![metadata_on("name"), metadata_on("price")],
        )
}
