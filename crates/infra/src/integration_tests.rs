//! Integration tests for the full command pipeline.
//!
//! Tests: Command → Validation → Product aggregate → CatalogStore → EventBus
//!
//! Verifies:
//! - Field rules and lookups reject bad input before anything is written
//! - Written products read back unchanged
//! - Child rows are reconciled and deleted with their product
//! - Optimistic concurrency conflicts are detected

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde_json::json;

    use catalog_core::{AggregateId, Measure};
    use catalog_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use catalog_products::{
        AlternativeUnitId, AttributeModelId, InputModes, PluVariant, PluVariantId, ProductId, ProductPrice, ProductType, QuantityInputMode,
        WarehousingStrategy, WeightInputMode,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::commands::{
        AddProductRequest, AlternativeUnitInput, AttributeValue, ChangeProductPriceListRequest, ChangeProductRequest,
        DeleteProductRequest, ImageUpload, ProductFields,
    };
    use crate::queries::data_table::{FilterRequest, SortDirection, SortRequest};
    use crate::queries::{
        DataTablePageRequest, GetAllProducts, GetMissingPriceListEntries, GetProductByCode, GetProductById,
        ProductResponse,
    };
    use crate::settings::ProductSettings;
    use crate::store::{CatalogStore, InMemoryCatalogStore, seed};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

    fn setup() -> (CommandDispatcher<Bus>, InMemoryCatalogStore, Bus) {
        let store = InMemoryCatalogStore::new();
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(Arc::new(store.clone()), bus.clone(), ProductSettings::default());
        (dispatcher, store, bus)
    }

    fn fields(name: &str, code: &str) -> ProductFields {
        ProductFields {
            name: name.to_string(),
            code: code.to_string(),
            purchase_tax_rate_id: Some(seed::VAT_23),
            sales_tax_rate_id: Some(seed::VAT_8),
            ..ProductFields::default()
        }
    }

    fn add_request(name: &str, code: &str) -> AddProductRequest {
        AddProductRequest {
            id: None,
            base_unit_id: Some(seed::PIECE),
            product_type: ProductType::Good,
            fields: fields(name, code),
        }
    }

    fn change_request(product: &ProductResponse, fields: ProductFields) -> ChangeProductRequest {
        ChangeProductRequest {
            id: product.id,
            expected_version: Some(product.version),
            base_unit_id: Some(product.base_unit_id),
            product_type: None,
            fields,
        }
    }

    async fn add(dispatcher: &CommandDispatcher<Bus>, request: AddProductRequest) -> ProductResponse {
        let created = dispatcher.dispatch(&request).await.unwrap();
        dispatcher.query(&GetProductById { id: created.id }).await.unwrap()
    }

    fn validation_errors(err: DispatchError) -> catalog_core::ValidationSummary {
        match err {
            DispatchError::Validation(summary) => summary,
            other => panic!("expected a validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() {
        let (dispatcher, _, _) = setup();
        add(&dispatcher, add_request("Milk", "MILK-1")).await;

        let err = dispatcher.dispatch(&add_request("Other milk", "MILK-1")).await.unwrap_err();
        assert!(validation_errors(err).has_error_for("code"));

        let all = dispatcher.query(&GetAllProducts).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn inverted_storage_temperatures_are_rejected() {
        let (dispatcher, _, _) = setup();
        let mut request = add_request("Yoghurt", "YOG");
        request.fields.min_storage_temperature = Some(8.0);
        request.fields.max_storage_temperature = Some(2.0);

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(validation_errors(err).has_error_for("min_storage_temperature"));
    }

    #[tokio::test]
    async fn counted_unit_cannot_be_the_weight_unit() {
        let (dispatcher, _, _) = setup();
        let mut request = add_request("Nails", "NAILS");
        request.fields.weight_unit_id = Some(seed::BOX);

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(validation_errors(err).has_error_for("weight_unit_id"));
    }

    #[tokio::test]
    async fn created_product_reads_back_unchanged() {
        let (dispatcher, _, _) = setup();
        let image = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
        let request = AddProductRequest {
            id: None,
            base_unit_id: Some(seed::KILOGRAM),
            product_type: ProductType::Good,
            fields: ProductFields {
                catalog_number: Some("CAT-7".to_string()),
                pkwiu_code: Some("10.51.11".to_string()),
                cn_code: Some("0401".to_string()),
                category_id: Some(seed::FOOD),
                description: Some("Fresh".to_string()),
                image: Some(ImageUpload {
                    file_name: "cheese.png".to_string(),
                    content: image.clone(),
                }),
                warehousing_strategy: WarehousingStrategy::Fefo,
                alternative_units: vec![AlternativeUnitInput {
                    id: None,
                    target_unit_id: seed::BOX,
                    conversion_ratio: Measure::from_units(12),
                }],
                attributes_data_model_id: Some(seed::attribute_model_id(ProductType::Good)),
                attributes: vec![AttributeValue {
                    key: "origin".to_string(),
                    value: json!("PL"),
                }],
                handling_unit_item_data_model_id: Some(seed::HANDLING_UNIT_ITEM_MODEL),
                is_freezable: true,
                default_use_by_days: 14,
                default_freeze_days: 90,
                quantity_input_modes: InputModes::from([QuantityInputMode::FromScale]),
                has_weight: true,
                weight_input_modes: InputModes::from([WeightInputMode::FromScale]),
                net_weight: "0.25".parse().unwrap(),
                tare: "0.01".parse().unwrap(),
                min_storage_temperature: Some(2.0),
                max_storage_temperature: Some(6.0),
                ..fields("Cheese", "CHEESE")
            },
        };

        let product = add(&dispatcher, request.clone()).await;
        let submitted = &request.fields;

        assert_eq!(product.version, 1);
        assert_eq!(product.name, submitted.name);
        assert_eq!(product.code, submitted.code);
        assert_eq!(product.catalog_number, submitted.catalog_number);
        assert_eq!(product.pkwiu_code, submitted.pkwiu_code);
        assert_eq!(product.cn_code, submitted.cn_code);
        assert_eq!(product.category_name.as_deref(), Some("Food"));
        assert_eq!(product.description, submitted.description);
        assert_eq!(product.warehousing_strategy, WarehousingStrategy::Fefo);
        assert_eq!(product.base_unit_symbol.as_deref(), Some("kg"));
        assert!(product.base_unit_is_weighted);
        assert_eq!(product.alternative_units.len(), 1);
        assert_eq!(product.alternative_units[0].target_unit_symbol.as_deref(), Some("box"));
        assert_eq!(product.alternative_units[0].conversion_ratio, Measure::from_units(12));
        assert_eq!(product.quantity_input_modes, submitted.quantity_input_modes);
        assert_eq!(product.weight_input_modes, submitted.weight_input_modes);
        assert_eq!(product.net_weight, submitted.net_weight);
        assert_eq!(product.tare, submitted.tare);
        assert_eq!(product.default_use_by_days, 14);
        assert_eq!(product.default_freeze_days, 90);
        assert!(product.is_freezable);
        assert_eq!(product.min_storage_temperature, Some(2.0));
        assert_eq!(product.max_storage_temperature, Some(6.0));
        assert_eq!(product.sales_tax_rate_value, Some(8));
        assert_eq!(product.attributes, Some(json!({"origin": "PL"})));
        assert_eq!(product.attributes_use_case.as_deref(), Some("Product.Good.Attributes"));
        assert_eq!(product.handling_unit_item_data_model_id, Some(seed::HANDLING_UNIT_ITEM_MODEL));

        let stored_image = product.image.expect("image");
        assert_eq!(stored_image.file_name, "cheese.png");
        assert_eq!(BASE64.decode(stored_image.content).unwrap(), image);
    }

    #[tokio::test]
    async fn unknown_handling_unit_item_model_is_rejected() {
        let (dispatcher, _, _) = setup();
        let mut request = add_request("Pallet wrap", "WRAP");
        request.fields.handling_unit_item_data_model_id = Some(AttributeModelId::new());

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(validation_errors(err).has_error_for("handling_unit_item_data_model_id"));
    }

    #[tokio::test]
    async fn weight_and_size_units_default_from_settings() {
        let (dispatcher, _, _) = setup();
        let product = add(&dispatcher, add_request("Flour", "FLOUR")).await;

        assert_eq!(product.weight_unit_id, Some(seed::KILOGRAM));
        assert_eq!(product.size_unit_id, Some(seed::CENTIMETRE));
    }

    #[tokio::test]
    async fn blank_code_is_generated_from_template() {
        let (dispatcher, _, _) = setup();
        let first = add(&dispatcher, add_request("First", "")).await;
        let second = add(&dispatcher, add_request("Second", "  ")).await;

        assert_eq!(first.code, "PRD/00001");
        assert_eq!(second.code, "PRD/00002");
    }

    #[tokio::test]
    async fn generated_code_skips_values_already_taken() {
        let (dispatcher, _, _) = setup();
        add(&dispatcher, add_request("Manual", "PRD/00001")).await;
        let generated = add(&dispatcher, add_request("Generated", "")).await;

        assert_eq!(generated.code, "PRD/00002");
    }

    #[tokio::test]
    async fn deleting_a_product_removes_its_plu_variants() {
        let (dispatcher, store, _) = setup();
        let product = add(&dispatcher, add_request("Apples", "APL")).await;

        let mut tx = store.begin().await.unwrap();
        for code in ["4131", "4132"] {
            tx.insert_plu_variant(&PluVariant {
                id: PluVariantId::new(),
                plu_id: product.id,
                code: code.to_string(),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        dispatcher
            .dispatch(&DeleteProductRequest {
                id: product.id,
                expected_version: None,
            })
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.plu_variants(product.id).await.unwrap().is_empty());
        assert!(tx.product(product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleting_unknown_product_fails_validation() {
        let (dispatcher, _, _) = setup();
        let err = dispatcher
            .dispatch(&DeleteProductRequest {
                id: ProductId::new(),
                expected_version: None,
            })
            .await
            .unwrap_err();
        assert!(validation_errors(err).has_error_for("id"));
    }

    #[tokio::test]
    async fn alternative_units_are_reconciled_by_id() {
        let (dispatcher, _, _) = setup();
        let mut request = add_request("Juice", "JUICE");
        request.fields.alternative_units = vec![
            AlternativeUnitInput {
                id: None,
                target_unit_id: seed::BOX,
                conversion_ratio: Measure::from_units(6),
            },
            AlternativeUnitInput {
                id: None,
                target_unit_id: seed::LITRE,
                conversion_ratio: Measure::from_units(1),
            },
        ];
        let product = add(&dispatcher, request).await;
        let kept = product
            .alternative_units
            .iter()
            .find(|u| u.target_unit_id == seed::BOX)
            .unwrap()
            .id;

        let mut changed = fields("Juice", "JUICE");
        changed.alternative_units = vec![
            AlternativeUnitInput {
                id: Some(kept),
                target_unit_id: seed::BOX,
                conversion_ratio: Measure::from_units(12),
            },
            AlternativeUnitInput {
                id: None,
                target_unit_id: seed::CENTIMETRE,
                conversion_ratio: Measure::from_units(30),
            },
        ];
        dispatcher.dispatch(&change_request(&product, changed)).await.unwrap();

        let product = dispatcher.query(&GetProductById { id: product.id }).await.unwrap();
        assert_eq!(product.version, 2);
        assert_eq!(product.alternative_units.len(), 2);
        let boxes = product.alternative_units.iter().find(|u| u.id == kept).unwrap();
        assert_eq!(boxes.conversion_ratio, Measure::from_units(12));
        assert!(product.alternative_units.iter().any(|u| u.target_unit_id == seed::CENTIMETRE));
        assert!(!product.alternative_units.iter().any(|u| u.target_unit_id == seed::LITRE));
    }

    #[tokio::test]
    async fn repeated_alternative_unit_ids_are_rejected() {
        let (dispatcher, _, _) = setup();
        let id = AlternativeUnitId::new();
        let mut request = add_request("Flour", "FLOUR");
        request.fields.alternative_units = vec![
            AlternativeUnitInput {
                id: Some(id),
                target_unit_id: seed::BOX,
                conversion_ratio: Measure::from_units(10),
            },
            AlternativeUnitInput {
                id: Some(id),
                target_unit_id: seed::KILOGRAM,
                conversion_ratio: Measure::from_units(2),
            },
        ];

        let err = dispatcher.dispatch(&request).await.unwrap_err();
        let summary = validation_errors(err);
        assert!(summary.has_error_for("alternative_units[1].id"));
        assert!(!summary.has_error_for("alternative_units[0].id"));
        assert!(dispatcher.query(&GetAllProducts).await.unwrap().is_empty());

        request.fields.alternative_units[1].id = None;
        let product = add(&dispatcher, request).await;
        assert_eq!(product.alternative_units.len(), 2);
        assert!(product.alternative_units.iter().any(|u| u.id == id && u.target_unit_id == seed::BOX));
    }

    #[tokio::test]
    async fn change_keeps_or_removes_the_image() {
        let (dispatcher, _, _) = setup();
        let mut request = add_request("Olives", "OLIVES");
        request.fields.image = Some(ImageUpload {
            file_name: "olives.jpg".to_string(),
            content: vec![0xFF, 0xD8, 0xFF],
        });
        let product = add(&dispatcher, request).await;

        dispatcher
            .dispatch(&change_request(&product, fields("Green olives", "OLIVES")))
            .await
            .unwrap();
        let kept = dispatcher.query(&GetProductById { id: product.id }).await.unwrap();
        assert_eq!(kept.image.as_ref().map(|i| i.file_name.as_str()), Some("olives.jpg"));

        let removal = ProductFields {
            remove_image: true,
            ..fields("Green olives", "OLIVES")
        };
        dispatcher.dispatch(&change_request(&kept, removal)).await.unwrap();
        let cleared = dispatcher.query(&GetProductById { id: product.id }).await.unwrap();
        assert!(cleared.image.is_none());
        assert_eq!(cleared.version, 3);
    }

    #[tokio::test]
    async fn names_and_codes_are_stored_exactly_as_sent() {
        let (dispatcher, _, _) = setup();

        let err = dispatcher.dispatch(&add_request(" Milk ", "MILK ")).await.unwrap_err();
        let summary = validation_errors(err);
        assert!(summary.has_error_for("name"));
        assert!(summary.has_error_for("code"));

        let product = add(&dispatcher, add_request("Milk  3.2%", "MILK/3.2")).await;
        assert_eq!(product.name, "Milk  3.2%");
        assert_eq!(product.code, "MILK/3.2");
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let (dispatcher, _, _) = setup();
        let product = add(&dispatcher, add_request("Salt", "SALT")).await;

        let mut request = change_request(&product, fields("Sea salt", "SALT"));
        request.expected_version = Some(product.version + 1);
        let err = dispatcher.dispatch(&request).await.unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));

        let unchanged = dispatcher.query(&GetProductById { id: product.id }).await.unwrap();
        assert_eq!(unchanged.name, "Salt");
    }

    #[tokio::test]
    async fn change_keeps_code_unique_but_allows_own_code() {
        let (dispatcher, _, _) = setup();
        add(&dispatcher, add_request("Sugar", "SUGAR")).await;
        let product = add(&dispatcher, add_request("Honey", "HONEY")).await;

        let err = dispatcher
            .dispatch(&change_request(&product, fields("Honey", "SUGAR")))
            .await
            .unwrap_err();
        assert!(validation_errors(err).has_error_for("code"));

        dispatcher
            .dispatch(&change_request(&product, fields("Wild honey", "HONEY")))
            .await
            .unwrap();
        let renamed = dispatcher
            .query(&GetProductByCode {
                code: "HONEY".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(renamed.name, "Wild honey");
    }

    #[tokio::test]
    async fn price_list_entries_are_reconciled() {
        let (dispatcher, _, _) = setup();
        let product = add(&dispatcher, add_request("Coffee", "COFFEE")).await;

        let prices = |retail: i64| {
            vec![ProductPrice {
                price_list_id: seed::RETAIL,
                net_price: Measure::from_units(retail),
            }]
        };
        dispatcher
            .dispatch(&ChangeProductPriceListRequest {
                id: product.id,
                expected_version: None,
                prices: prices(20),
            })
            .await
            .unwrap();

        let missing = dispatcher.query(&GetMissingPriceListEntries { id: product.id }).await.unwrap();
        assert_eq!(missing.entries.len(), 1);
        assert_eq!(missing.entries[0].id, seed::WHOLESALE);

        let mut negative = prices(0);
        negative[0].net_price = Measure::from_units(-1);
        let err = dispatcher
            .dispatch(&ChangeProductPriceListRequest {
                id: product.id,
                expected_version: None,
                prices: negative,
            })
            .await
            .unwrap_err();
        assert!(validation_errors(err).has_error_for("prices[0].net_price"));
    }

    #[tokio::test]
    async fn data_table_filters_sorts_and_pages() {
        let (dispatcher, _, _) = setup();
        for (name, code) in [("Banana", "B-1"), ("apple", "A-1"), ("Cherry", "C-1"), ("Apricot", "A-2")] {
            add(&dispatcher, add_request(name, code)).await;
        }

        let page = dispatcher
            .query(&DataTablePageRequest {
                page: 1,
                page_size: Some(2),
                sort: Some(SortRequest {
                    column: "code".to_string(),
                    direction: SortDirection::Desc,
                }),
                filters: Vec::new(),
            })
            .await
            .unwrap();
        assert_eq!(page.total_rows, 4);
        assert_eq!(page.total_pages, 2);
        let codes: Vec<_> = page.rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, ["C-1", "B-1"]);

        let filtered = dispatcher
            .query(&DataTablePageRequest {
                filters: vec![FilterRequest {
                    column: "name".to_string(),
                    value: json!("AP"),
                }],
                ..DataTablePageRequest::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = filtered.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Apricot", "apple"]);
    }

    #[tokio::test]
    async fn committed_changes_are_published() {
        let (dispatcher, _, bus) = setup();
        let sub = bus.subscribe();

        let product = add(&dispatcher, add_request("Rice", "RICE")).await;
        let envelope = sub.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.event_type(), "products.product.created");
        assert_eq!(envelope.aggregate_version(), 1);
        assert_eq!(envelope.aggregate_id(), AggregateId::from(product.id));
        while sub.try_recv().is_ok() {}

        dispatcher
            .dispatch(&DeleteProductRequest {
                id: product.id,
                expected_version: Some(1),
            })
            .await
            .unwrap();
        let published: Vec<_> = std::iter::from_fn(|| sub.try_recv().ok()).collect();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "products.product.deleted");
    }

    #[tokio::test]
    async fn rejected_commands_publish_nothing() {
        let (dispatcher, _, bus) = setup();
        let sub = bus.subscribe();

        let _ = dispatcher.dispatch(&add_request("", "EMPTY")).await.unwrap_err();
        assert!(sub.try_recv().is_err());
    }
}
