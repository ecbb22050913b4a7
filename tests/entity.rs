#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use time::{
        Date, PrimitiveDateTime,
        macros::{date, datetime},
    };
    use uuid::Uuid;
    use strata::{
        AttributeKind, DefinitionProvider, Entity, FieldKind, FilterOperator, ItemSelection,
        RepositoryError, Value,
    };

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(schema = "shop")]
    struct Category {
        #[strata(auto_increment)]
        id: i64,
        name: String,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(schema = "shop", alternate_key = code)]
    struct Product {
        #[strata(auto_increment)]
        id: i64,
        code: String,
        name: String,
        price: Decimal,
        category_id: Option<i64>,
        #[strata(related(entity = Category, use_attribute_alias))]
        category_name: Option<String>,
        #[strata(ignore)]
        dirty: bool,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(name = "product_import")]
    struct ProductImport {
        code: String,
        label: String,
        price: Decimal,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(schema = "hr", name = "employee")]
    struct Manager {
        #[strata(primary_key)]
        id: i32,
        name: String,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(schema = "hr")]
    struct Employee {
        #[strata(primary_key)]
        id: i32,
        #[strata(name = "full_name")]
        name: String,
        manager_id: Option<i32>,
        #[strata(relation = "manager")]
        manager: Option<Manager>,
        #[strata(skip)]
        notes: String,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    #[strata(schema = "hr", name = "employee")]
    struct Intern {
        #[strata(primary_key)]
        id: i32,
        #[strata(name = "full_name")]
        name: String,
        #[strata(relation)]
        supervisor: Option<Manager>,
    }

    #[derive(Entity, Debug, Clone, Default, PartialEq)]
    struct Broken {
        #[strata(primary_key)]
        id: i32,
        #[strata(related(entity = Category))]
        missing: Option<String>,
    }

    #[derive(Entity, Debug, Clone, PartialEq)]
    #[strata(schema = "logistics")]
    struct Shipment {
        #[strata(primary_key)]
        id: Uuid,
        shipped_on: Date,
        delivered_at: Option<PrimitiveDateTime>,
        payload: serde_json::Value,
    }

    impl Product {
        fn sample() -> Self {
            Self {
                id: 0,
                code: "HAM-01".into(),
                name: "Hammer".into(),
                price: Decimal::new(1250, 2),
                category_id: Some(4),
                category_name: None,
                dirty: true,
            }
        }
    }

    #[test]
    fn derived_descriptor() {
        let descriptor = Product::descriptor();
        assert!(descriptor.type_name.ends_with("::Product"));
        assert_eq!(descriptor.entity_name, "product");
        assert_eq!(descriptor.schema, "shop");
        assert_eq!(descriptor.name, "product");
        assert_eq!(descriptor.alternate_key, ["code"]);
        assert_eq!(descriptor.fields.len(), 7);
        assert!(matches!(descriptor.fields[0].kind, FieldKind::AutoNumber));
        assert!(matches!(descriptor.fields[0].value, Value::Int64(None)));
        assert!(matches!(descriptor.fields[3].value, Value::Decimal(None)));
        assert!(matches!(
            descriptor.fields[5].kind,
            FieldKind::Related {
                alias: None,
                use_attribute_alias: true,
                ..
            }
        ));
        assert!(matches!(descriptor.fields[6].kind, FieldKind::Ignored));
        assert_eq!(
            descriptor.columns().collect::<Vec<_>>(),
            ["id", "code", "name", "price", "category_id"]
        );
        assert_eq!(descriptor.slot_count(), 7);

        let employee = Employee::descriptor();
        // Skipped fields are not described
        assert_eq!(employee.fields.len(), 4);
        assert_eq!(employee.fields[1].column_name(), "full_name");
        assert_eq!(employee.slot_count(), 6);
        assert_eq!(Manager::descriptor().entity_name, "manager");
        assert_eq!(ProductImport::descriptor().schema, "");
    }

    #[test]
    fn values_round_trip_through_slots() {
        let product = Product::sample();
        let values = product.to_values();
        assert_eq!(values.len(), 7);
        assert_eq!(values[1], Value::Varchar(Some("HAM-01".into())));
        assert_eq!(values[4], Value::Int64(Some(4)));
        assert_eq!(values[5], Value::Varchar(None));
        assert_eq!(values[6], Value::Null);
        let decoded = Product::from_values(values).unwrap();
        assert_eq!(
            decoded,
            Product {
                dirty: false,
                ..product
            }
        );

        let employee = Employee {
            id: 3,
            name: "Ada".into(),
            manager_id: Some(1),
            manager: Some(Manager {
                id: 1,
                name: "Grace".into(),
            }),
            notes: "not persisted".into(),
        };
        let values = employee.to_values();
        assert_eq!(
            values,
            [
                Value::Int32(Some(3)),
                Value::Varchar(Some("Ada".into())),
                Value::Int32(Some(1)),
                Value::Null,
                Value::Int32(Some(1)),
                Value::Varchar(Some("Grace".into())),
            ]
        );
        let decoded = Employee::from_values(values).unwrap();
        assert_eq!(decoded.manager, employee.manager);
        assert_eq!(decoded.notes, "");

        let mut without_manager = Employee::from_values(vec![
            Value::Int32(Some(3)),
            Value::Varchar(Some("Ada".into())),
            Value::Int32(None),
            Value::Null,
            Value::Null,
            Value::Null,
        ])
        .unwrap();
        assert_eq!(without_manager.manager, None);
        without_manager.id = 0;
        assert!(Employee::from_values(without_manager.to_values()[..4].to_vec()).is_err());
    }

    #[test]
    fn resolve_flattened_definition() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Employee>().unwrap();
        assert_eq!(definition.location.schema, "hr");
        assert_eq!(definition.location.name, "employee");
        assert_eq!(definition.location.alias, None);
        assert_eq!(definition.slot_count(), 6);
        let kinds: Vec<_> = definition.attributes.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            [
                AttributeKind::DirectPrimaryKey,
                AttributeKind::DirectAttribute,
                AttributeKind::DirectAttribute,
                AttributeKind::Relation,
                AttributeKind::RelatedPrimaryKey,
                AttributeKind::RelatedAttribute,
            ]
        );
        for (i, attribute) in definition.attributes.iter().enumerate() {
            assert_eq!(attribute.ordinal, i);
        }
        assert_eq!(definition.attributes[1].physical_name, "full_name");
        assert_eq!(definition.attributes[1].property, "name");

        let manager = &definition.attributes[5];
        assert_eq!(manager.location.alias, Some("manager"));
        assert_eq!(manager.location.name, "employee");
        assert_eq!(manager.path.len(), 2);
        assert_eq!(manager.path[0], definition.location);
        assert_eq!(manager.key(), Manager::name.aliased("manager").key());
        assert!(definition.find(&Manager::name.key()).is_some());

        assert_eq!(
            definition.primary_key().map(|v| v.property).collect::<Vec<_>>(),
            ["id"]
        );
        assert_eq!(
            definition
                .updatable()
                .map(|v| v.physical_name)
                .collect::<Vec<_>>(),
            ["full_name", "manager_id"]
        );
    }

    #[test]
    fn resolve_is_idempotent() {
        let definitions = DefinitionProvider::new();
        let first = definitions.resolve::<Product>().unwrap();
        let second = definitions.resolve::<Product>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = DefinitionProvider::new().resolve::<Product>().unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(*first, *other);
    }

    #[test]
    fn related_attribute_alias() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let related = &definition.attributes[5];
        assert_eq!(related.kind, AttributeKind::ExplicitRelatedAttribute);
        assert_eq!(related.physical_name, "name");
        assert_eq!(related.alias, Some("category_name"));
        assert_eq!(related.reference_name(), "category_name");
        assert_eq!(related.location.name, "category");
        assert!(related.location.is_virtual);
        assert_eq!(related.key(), Product::category_name.key());
        assert_eq!(definition.attributes[6].kind, AttributeKind::MappedAttribute);
        assert_eq!(
            definition
                .alternate_key()
                .map(|v| v.property)
                .collect::<Vec<_>>(),
            ["code"]
        );
        assert_eq!(definition.auto_number().map(|v| v.ordinal), Some(0));
        assert_eq!(
            definition
                .insertable()
                .map(|v| v.physical_name)
                .collect::<Vec<_>>(),
            ["code", "name", "price", "category_id"]
        );
    }

    #[test]
    fn self_join_gets_the_property_alias() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Intern>().unwrap();
        let supervisor = &definition.attributes[3];
        assert_eq!(supervisor.location.name, "employee");
        assert_eq!(supervisor.location.alias, Some("supervisor"));
        assert_eq!(supervisor.physical_name, "id");
        assert_eq!(definition.attributes[0].location.alias, None);
    }

    #[test]
    fn unknown_related_column() {
        let definitions = DefinitionProvider::new();
        let error = definitions.resolve::<Broken>().unwrap_err();
        assert!(matches!(error, RepositoryError::MetadataResolution { .. }));
        assert!(error.to_string().contains("`missing`"), "{}", error);
        assert_eq!(error.code(), "METADATA_RESOLUTION");
    }

    #[test]
    fn unique_selection_prefers_the_primary_key() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();

        let stored = Product {
            id: 5,
            ..Product::sample()
        };
        let selection = ItemSelection::unique(&definition, &stored).unwrap();
        assert_eq!(selection.filters.len(), 1);
        assert_eq!(selection.filters[0].attribute, Product::id.key());
        assert_eq!(selection.filters[0].operator, FilterOperator::Equal);
        assert_eq!(selection.filters[0].values, [Value::Int64(Some(5))]);

        let fresh = Product::sample();
        let selection = ItemSelection::unique(&definition, &fresh).unwrap();
        assert_eq!(selection.filters.len(), 1);
        assert_eq!(selection.filters[0].attribute, Product::code.key());
        assert_eq!(
            selection.filters[0].values,
            [Value::Varchar(Some("HAM-01".into()))]
        );

        let definition = definitions.resolve::<ProductImport>().unwrap();
        let import = ProductImport {
            code: "HAM-01".into(),
            label: String::new(),
            price: Decimal::new(3, 0),
        };
        let selection = ItemSelection::unique(&definition, &import).unwrap();
        let attributes: Vec<_> = selection.filters.iter().map(|v| v.attribute).collect();
        assert_eq!(
            attributes,
            [ProductImport::code.key(), ProductImport::price.key()]
        );
        assert_eq!(
            selection,
            ItemSelection::by_example(&definition, &import).unwrap()
        );
    }

    #[test]
    fn selection_of_another_entity_is_rejected() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Category>().unwrap();
        let error = ItemSelection::unique(&definition, &Product::sample()).unwrap_err();
        assert!(error.is_usage());
        assert!(ItemSelection::<Product>::by_key(&definition, [Value::from(1i64)]).is_err());

        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::by_key(&definition, [Value::from(9i64)]).unwrap();
        assert_eq!(selection.filters[0].values, [Value::Int64(Some(9))]);
        assert!(ItemSelection::<Product>::by_key(&definition, []).is_err());
    }

    #[test]
    fn typed_values() {
        let descriptor = Shipment::descriptor();
        assert!(matches!(descriptor.fields[0].value, Value::Uuid(None)));
        assert!(matches!(descriptor.fields[1].value, Value::Date(None)));
        assert!(matches!(descriptor.fields[2].value, Value::Timestamp(None)));
        assert!(matches!(descriptor.fields[3].value, Value::Json(None)));

        let id = Uuid::parse_str("5c9a4b44-2f3e-4c57-9f0d-1e8d4a7b2c10").unwrap();
        let shipment = Shipment {
            id,
            shipped_on: date!(2024 - 03 - 01),
            delivered_at: None,
            payload: serde_json::json!({ "boxes": 3 }),
        };
        let values = shipment.to_values();
        assert_eq!(values[2], Value::Timestamp(None));
        assert_eq!(Shipment::from_values(values).unwrap(), shipment);

        let decoded = Shipment::from_values(vec![
            Value::Varchar(Some("5c9a4b44-2f3e-4c57-9f0d-1e8d4a7b2c10".into())),
            Value::Varchar(Some("2024-03-01".into())),
            Value::Varchar(Some("2024-03-04 10:30:00".into())),
            Value::Varchar(Some(r#"{"boxes":3}"#.into())),
        ])
        .unwrap();
        assert_eq!(decoded.id, id);
        assert_eq!(decoded.delivered_at, Some(datetime!(2024-03-04 10:30:00)));
        assert_eq!(decoded.payload["boxes"], 3);
        log::debug!("Decoded {:?}", decoded);
    }
}
