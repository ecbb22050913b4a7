#[cfg(test)]
mod tests {
    use indoc::indoc;
    use rust_decimal::Decimal;
    use strata::{
        DefinitionProvider, Entity, GenericSqlWriter, IsolationLevel, ItemSelection,
        PostgresSqlWriter, RepositoryError, SqlWriter, StructuredCommand, UsageError, Value,
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
        name: String,
        manager_id: Option<i32>,
        #[strata(relation = "manager")]
        manager: Option<Manager>,
    }

    const WRITER: GenericSqlWriter = GenericSqlWriter {};
    const POSTGRES: PostgresSqlWriter = PostgresSqlWriter {};

    fn imports() -> Vec<ProductImport> {
        vec![
            ProductImport {
                code: "HAM-01".into(),
                label: "Hammer".into(),
                price: Decimal::new(1250, 2),
            },
            ProductImport {
                code: "SAW-02".into(),
                label: "Saw".into(),
                price: Decimal::new(2000, 2),
            },
        ]
    }

    #[test]
    fn select_with_join_order_and_page() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new()
            .inner_join(Product::category_id, Category::id)
            .where_greater(Product::price, Decimal::new(10, 0))
            .where_equal(Category::name, "Tools")
            .order_by(Product::name)
            .order_by_descending(Product::price)
            .page(10, 3);

        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                SELECT "shop"."product"."id", "shop"."product"."code", "shop"."product"."name", "shop"."product"."price", "shop"."product"."category_id", "shop"."category"."name" AS "category_name"
                FROM "shop"."product"
                INNER JOIN "shop"."category" ON "shop"."product"."category_id" = "shop"."category"."id"
                WHERE "shop"."product"."price" > ? AND "shop"."category"."name" = ?
                ORDER BY "shop"."product"."name" ASC, "shop"."product"."price" DESC
                OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY;
            "#}
            .trim()
        );
        assert_eq!(
            statement.params,
            [
                Value::Decimal(Some(Decimal::new(10, 0))),
                Value::Varchar(Some("Tools".into())),
            ]
        );

        let statement = POSTGRES
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert!(
            statement.sql.ends_with(indoc! {r#"
                WHERE "shop"."product"."price" > $1 AND "shop"."category"."name" = $2
                ORDER BY "shop"."product"."name" ASC, "shop"."product"."price" DESC
                LIMIT 10 OFFSET 20;"#}),
            "{}",
            statement.sql
        );
    }

    #[test]
    fn select_without_join_skips_related_columns() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let statement = WRITER
            .compile_select(&definition, ItemSelection::<Product>::new().criteria())
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                SELECT "shop"."product"."id", "shop"."product"."code", "shop"."product"."name", "shop"."product"."price", "shop"."product"."category_id"
                FROM "shop"."product";
            "#}
            .trim()
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn parameters_follow_placeholders() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new()
            .where_equal(Product::code, "HAM-01")
            .where_between(Product::price, Decimal::new(1, 0), Decimal::new(5, 0))
            .where_in(Product::category_id, [3i64, 4])
            .where_like(Product::name, "Ham%");

        let expected = [
            Value::Varchar(Some("HAM-01".into())),
            Value::Decimal(Some(Decimal::new(1, 0))),
            Value::Decimal(Some(Decimal::new(5, 0))),
            Value::Int64(Some(3)),
            Value::Int64(Some(4)),
            Value::Varchar(Some("Ham%".into())),
        ];
        let statement = POSTGRES
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert!(
            statement.sql.ends_with(indoc! {r#"
                WHERE "shop"."product"."code" = $1 AND "shop"."product"."price" BETWEEN $2 AND $3 AND "shop"."product"."category_id" IN ($4, $5) AND "shop"."product"."name" LIKE $6;"#}),
            "{}",
            statement.sql
        );
        assert_eq!(statement.params, expected);

        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert_eq!(statement.sql.matches('?').count(), 6);
        assert_eq!(statement.params, expected);
    }

    #[test]
    fn null_equality_renders_is_null() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new()
            .where_equal(Product::category_id, None::<i64>)
            .where_not_null(Product::name)
            .where_in(Product::code, [Some("A"), None, Some("B")].map(|v| v.map(String::from)))
            .where_between(Product::price, Value::Null, Decimal::new(7, 0));
        let statement = WRITER
            .compile_exists(&definition, selection.criteria())
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                SELECT EXISTS (SELECT 1
                FROM "shop"."product"
                WHERE "shop"."product"."category_id" IS NULL AND "shop"."product"."name" IS NOT NULL AND ("shop"."product"."code" IN (?, ?) OR "shop"."product"."code" IS NULL) AND "shop"."product"."price" <= ?);
            "#}
            .trim()
        );
        assert_eq!(
            statement.params,
            [
                Value::Varchar(Some("A".into())),
                Value::Varchar(Some("B".into())),
                Value::Decimal(Some(Decimal::new(7, 0))),
            ]
        );
    }

    #[test]
    fn invalid_filters() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();

        let selection = ItemSelection::<Product>::new().where_less(Product::price, Value::Null);
        let error = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Usage(UsageError::InvalidFilter(..))
        ));

        let selection =
            ItemSelection::<Product>::new().where_between(Product::price, Value::Null, Value::Null);
        assert!(WRITER.compile_select(&definition, selection.criteria()).is_err());

        // Not joined, not reachable
        let selection = ItemSelection::<Product>::new().where_equal(Manager::name, "Grace");
        let error = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Usage(UsageError::SelectionMismatch(..))
        ));

        let selection = ItemSelection::<Product>::new().where_in(Product::id, Vec::<i64>::new());
        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert!(statement.sql.ends_with("WHERE 1 = 0;"), "{}", statement.sql);
    }

    #[test]
    fn self_join_with_alias() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Employee>().unwrap();
        let selection = ItemSelection::<Employee>::new()
            .left_join(Employee::manager_id, Manager::id.aliased("manager"))
            .where_equal(Manager::name.aliased("manager"), "Grace");
        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                SELECT "hr"."employee"."id", "hr"."employee"."name", "hr"."employee"."manager_id", "manager"."id", "manager"."name"
                FROM "hr"."employee"
                LEFT JOIN "hr"."employee" "manager" ON "hr"."employee"."manager_id" = "manager"."id"
                WHERE "manager"."name" = ?;
            "#}
            .trim()
        );
    }

    #[test]
    fn unjoined_columns_are_rejected() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Employee>().unwrap();
        let selection =
            ItemSelection::<Employee>::new().where_equal(Manager::name.aliased("manager"), "Grace");
        let error = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Usage(UsageError::SelectionMismatch(..))
        ));
        let selection = ItemSelection::<Employee>::new().order_by(Manager::name.aliased("manager"));
        assert!(WRITER.compile_select(&definition, selection.criteria()).is_err());
        let selection =
            ItemSelection::<Employee>::new().where_equal(Manager::name.aliased("manager"), "Grace");
        assert!(WRITER.compile_delete(&definition, selection.criteria()).is_err());

        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new().order_by(Product::category_name);
        assert!(WRITER.compile_select(&definition, selection.criteria()).is_err());
        let selection = ItemSelection::<Product>::new()
            .inner_join(Product::category_id, Category::id)
            .order_by(Product::category_name);
        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert!(
            statement
                .sql
                .ends_with("ORDER BY \"shop\".\"category\".\"name\" ASC;"),
            "{}",
            statement.sql
        );
    }

    #[test]
    fn first_row_is_limited() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new().where_equal(Product::code, "HAM-01");
        let statement = WRITER
            .compile_select(&definition, selection.criteria().first())
            .unwrap();
        assert!(
            statement
                .sql
                .ends_with("WHERE \"shop\".\"product\".\"code\" = ?\nFETCH FIRST 1 ROWS ONLY;"),
            "{}",
            statement.sql
        );
        let statement = POSTGRES
            .compile_select(&definition, selection.criteria().first())
            .unwrap();
        assert!(
            statement
                .sql
                .ends_with("WHERE \"shop\".\"product\".\"code\" = $1\nLIMIT 1;"),
            "{}",
            statement.sql
        );

        // An explicit page is kept as is
        let selection = selection.page(2, 3);
        let statement = POSTGRES
            .compile_select(&definition, selection.criteria().first())
            .unwrap();
        assert!(statement.sql.ends_with("\nLIMIT 2 OFFSET 4;"), "{}", statement.sql);
        let statement = WRITER
            .compile_select(&definition, selection.criteria())
            .unwrap();
        assert!(!statement.sql.contains("FETCH FIRST"), "{}", statement.sql);
    }

    #[test]
    fn insert_statements() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let product = Product {
            id: 0,
            code: "HAM-01".into(),
            name: "Hammer".into(),
            price: Decimal::new(1250, 2),
            category_id: None,
            category_name: None,
        };
        let values = product.to_values();

        let statement = WRITER.compile_insert(&definition, &values).unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                INSERT INTO "shop"."product" ("code", "name", "price", "category_id")
                VALUES (?, ?, ?, ?);
            "#}
            .trim()
        );
        assert_eq!(
            statement.params,
            [
                Value::Varchar(Some("HAM-01".into())),
                Value::Varchar(Some("Hammer".into())),
                Value::Decimal(Some(Decimal::new(1250, 2))),
                Value::Int64(None),
            ]
        );

        let statement = POSTGRES.compile_insert(&definition, &values).unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                INSERT INTO "shop"."product" ("code", "name", "price", "category_id")
                VALUES ($1, $2, $3, $4)
                RETURNING "id";
            "#}
            .trim()
        );

        let error = WRITER.compile_insert(&definition, &values[..3]).unwrap_err();
        assert!(error.is_usage());
    }

    #[test]
    fn update_with_explicit_columns() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let product = Product {
            id: 7,
            code: "HAM-01".into(),
            name: "Claw hammer".into(),
            price: Decimal::new(1399, 2),
            category_id: Some(2),
            category_name: None,
        };
        let selection = ItemSelection::unique(&definition, &product).unwrap();
        let statement = POSTGRES
            .compile_update(
                &definition,
                selection.criteria(),
                &product.to_values(),
                Some(&[Product::name.key(), Product::price.key()]),
            )
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                UPDATE "shop"."product" SET "name" = $1, "price" = $2
                WHERE "shop"."product"."id" = $3;
            "#}
            .trim()
        );
        assert_eq!(
            statement.params,
            [
                Value::Varchar(Some("Claw hammer".into())),
                Value::Decimal(Some(Decimal::new(1399, 2))),
                Value::Int64(Some(7)),
            ]
        );

        let statement = WRITER
            .compile_update(&definition, selection.criteria(), &product.to_values(), None)
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                UPDATE "shop"."product" SET "code" = ?, "name" = ?, "price" = ?, "category_id" = ?
                WHERE "shop"."product"."id" = ?;
            "#}
            .trim()
        );

        // Keys are never updated
        let error = WRITER
            .compile_update(
                &definition,
                selection.criteria(),
                &product.to_values(),
                Some(&[Product::id.key()]),
            )
            .unwrap_err();
        assert!(error.is_usage());
    }

    #[test]
    fn delete_through_join() {
        let definitions = DefinitionProvider::new();
        let definition = definitions.resolve::<Product>().unwrap();
        let selection = ItemSelection::<Product>::new()
            .inner_join(Product::category_id, Category::id)
            .where_equal(Category::name, "Discontinued");
        let statement = WRITER
            .compile_delete(&definition, selection.criteria())
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                DELETE FROM "shop"."product"
                WHERE EXISTS (SELECT 1
                FROM "shop"."category"
                WHERE "shop"."product"."category_id" = "shop"."category"."id" AND "shop"."category"."name" = ?);
            "#}
            .trim()
        );

        let statement = WRITER
            .compile_delete(
                &definition,
                ItemSelection::<Product>::new()
                    .where_equal(Product::code, "HAM-01")
                    .criteria(),
            )
            .unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                DELETE FROM "shop"."product"
                WHERE "shop"."product"."code" = ?;
            "#}
            .trim()
        );
    }

    #[test]
    fn structured_insert_standard() {
        let definitions = DefinitionProvider::new();
        let rows = imports();
        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code, Product::name, Product::price])
            .from(&[ProductImport::code, ProductImport::label, ProductImport::price])
            .on_conflict_on_do_nothing(&[Product::code]);
        let (statement, shape) = command.compile(&definitions, &WRITER, false).unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                INSERT INTO "shop"."product" ("code", "name", "price") VALUES
                (?, ?, ?),
                (?, ?, ?)
                ON CONFLICT ("code") DO NOTHING;
            "#}
            .trim()
        );
        assert_eq!(statement.params.len(), 6);
        assert_eq!(statement.params[3], Value::Varchar(Some("SAW-02".into())));
        assert!(shape.is_empty());
    }

    #[test]
    fn structured_upsert_from_json() {
        let definitions = DefinitionProvider::new();
        let rows = imports();
        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code, Product::name, Product::price])
            .from(&[ProductImport::code, ProductImport::label, ProductImport::price])
            .on_conflict_do_update(&[Product::code], &[Product::name, Product::price])
            .returning(&[Product::id, Product::code]);
        let (statement, shape) = command.compile(&definitions, &POSTGRES, false).unwrap();
        assert_eq!(
            statement.sql,
            indoc! {r#"
                INSERT INTO "shop"."product" ("code", "name", "price")
                SELECT "source"."code", "source"."label", "source"."price"
                FROM json_to_recordset($1::json) AS "source"("code" TEXT, "label" TEXT, "price" NUMERIC)
                ON CONFLICT ("code") DO UPDATE SET
                "name" = EXCLUDED."name",
                "price" = EXCLUDED."price"
                RETURNING "id", "code";
            "#}
            .trim()
        );
        assert_eq!(
            statement.params,
            [Value::Json(Some(serde_json::json!([
                { "code": "HAM-01", "label": "Hammer", "price": "12.50" },
                { "code": "SAW-02", "label": "Saw", "price": "20.00" },
            ])))]
        );
        assert_eq!(shape.names(), ["id", "code"]);
    }

    #[test]
    fn structured_command_errors() {
        let definitions = DefinitionProvider::new();
        let rows = imports();

        // Source matched by name, `ProductImport` has no `name` column
        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code, Product::name]);
        assert!(command.compile(&definitions, &WRITER, false).is_err());

        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code, Product::name])
            .from(&[ProductImport::code]);
        assert!(command.compile(&definitions, &WRITER, false).is_err());

        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code])
            .from(&[ProductImport::code])
            .on_conflict_do_update(&[Product::code], &[]);
        let error = command.compile(&definitions, &WRITER, false).unwrap_err();
        assert!(error.is_usage());

        let command = StructuredCommand::new(&rows)
            .insert_into::<Product>(&[Product::code])
            .from(&[ProductImport::code])
            .returning(&[Category::name]);
        assert!(command.compile(&definitions, &WRITER, false).is_err());
    }

    #[test]
    fn transaction_statements() {
        assert_eq!(WRITER.compile_begin(None).sql, "START TRANSACTION;");
        assert_eq!(
            WRITER
                .compile_begin(Some(IsolationLevel::RepeatableRead))
                .sql,
            "START TRANSACTION ISOLATION LEVEL REPEATABLE READ;"
        );
        assert_eq!(
            POSTGRES.compile_begin(Some(IsolationLevel::Serializable)).sql,
            "BEGIN ISOLATION LEVEL SERIALIZABLE;"
        );
        assert_eq!(WRITER.compile_commit().sql, "COMMIT;");
        assert_eq!(POSTGRES.compile_rollback().sql, "ROLLBACK;");
    }

    #[test]
    fn placeholder_mismatch_is_detected() {
        let statement = strata::CompiledStatement::new(
            "SELECT 1 WHERE a = $2 AND b = $1",
            vec![Value::from(1i32), Value::from(2i32)],
        );
        let error = POSTGRES.verify_placeholders(&statement).unwrap_err();
        assert!(matches!(error, RepositoryError::CompilationInvariant(..)));

        let statement = strata::CompiledStatement::new(
            "SELECT '?' WHERE a = ?",
            vec![Value::from(1i32)],
        );
        assert!(WRITER.verify_placeholders(&statement).is_ok());
    }
}
