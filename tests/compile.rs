//! End-to-end compilations across dialects.
use expect_test::expect;
use once_cell::sync::Lazy;
use treeline::ast::builder::*;
use treeline::ast::{Expr, TypeRef, Value};
use treeline::dialect::DialectProfile;
use treeline::error::ErrorKind;
use treeline::schema::{SchemaRegistry, TableSchema};
use treeline::{Compilation, Compiler};

static SCHEMA: Lazy<SchemaRegistry> = Lazy::new(|| {
    SchemaRegistry::new()
        .register(
            TableSchema::build("Order", "orders")
                .generated("Id", "id")
                .field("Status", "status")
                .field("Total", "total")
                .field("Name", "name")
                .field("CustomerId", "customer_id")
                .field("ShipDate", "ship_date")
                .primary_key(&["Id"])
                .finish(),
        )
        .register(
            TableSchema::build("ArchivedOrder", "archived_orders")
                .generated("Id", "id")
                .field("Status", "status")
                .field("Total", "total")
                .field("Name", "name")
                .field("CustomerId", "customer_id")
                .field("ShipDate", "ship_date")
                .primary_key(&["Id"])
                .finish(),
        )
        .register(
            TableSchema::build("Customer", "customers")
                .generated("Id", "id")
                .field("Name", "name")
                .field("Region", "region")
                .primary_key(&["Id"])
                .finish(),
        )
        .register(
            TableSchema::build("OrderItem", "order_items")
                .generated("Id", "id")
                .field("OrderId", "order_id")
                .field("Price", "price")
                .field("Qty", "qty")
                .primary_key(&["Id"])
                .finish(),
        )
        .register(
            TableSchema::build("OrderSummary", "orders")
                .field("Id", "id")
                .field("Total", "total")
                .primary_key(&["Id"])
                .finish(),
        )
        .register(
            TableSchema::build("Ledger", "ledger")
                .field("Entry", "entry")
                .field("Amount", "amount")
                .primary_key(&["Entry"])
                .finish(),
        )
});

fn order() -> TypeRef {
    TypeRef::entity("Order")
}

fn o() -> Expr {
    param("o", order())
}

fn compile_on(profile: &DialectProfile, query: &Expr) -> Compilation {
    Compiler::new(profile, &*SCHEMA).compile(query).unwrap()
}

fn compile(query: &Expr) -> Compilation {
    compile_on(&DialectProfile::normal(), query)
}

fn compile_err(query: &Expr) -> treeline::Error {
    Compiler::new(&DialectProfile::normal(), &*SCHEMA)
        .compile(query)
        .unwrap_err()
}

#[test]
fn filtered_ordered_paginated_projection_on_sql_server() {
    let query = from("Order")
        .filter(lambda(
            "o",
            order(),
            o().get("Status", TypeRef::Int32)
                .eq(val(1))
                .and(o().get("Total", TypeRef::Decimal).gt(val(100))),
        ))
        .order_by_desc(lambda("o", order(), o().get("Total", TypeRef::Decimal)))
        .take(10)
        .select(lambda(
            "o",
            order(),
            new_shape(vec![
                ("Id", o().get("Id", TypeRef::Int64)),
                ("Total", o().get("Total", TypeRef::Decimal)),
            ]),
        ));

    let compilation = compile_on(&DialectProfile::sql_server(), &query);

    assert_eq!(
        "SELECT TOP (10) t0.[id] AS [Id], t0.[total] AS [Total] FROM [orders] t0 \
         WHERE (t0.[status] = @Status AND t0.[total] > @Total) ORDER BY t0.[total] DESC",
        compilation.sql
    );
    assert_eq!(2, compilation.params.len());
    assert_eq!(Some(&Value::Int32(1)), compilation.params.get("Status"));
    assert_eq!(Some(&Value::Int32(100)), compilation.params.get("Total"));
}

#[test]
fn later_take_keeps_the_smaller_bound() {
    let query = from("Order").take(5).take(3);
    let compilation = compile(&query);

    assert!(compilation.sql.ends_with("LIMIT 3"), "got: {}", compilation.sql);
}

#[test]
fn loosening_take_is_a_range_violation() {
    let query = from("Order").take(3).take(5);
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::RangeViolation(_)));
}

#[test]
fn take_zero_is_a_range_violation() {
    let err = compile_err(&from("Order").take(0));
    assert!(matches!(err.kind(), ErrorKind::RangeViolation(_)));
}

#[test]
fn negative_skip_is_a_range_violation() {
    let err = compile_err(&from("Order").skip(-1));
    assert!(matches!(err.kind(), ErrorKind::RangeViolation(_)));
}

#[test]
fn skips_accumulate() {
    let query = from("Order").skip(2).skip(3);
    let compilation = compile(&query);

    assert!(compilation.sql.ends_with("OFFSET 5"), "got: {}", compilation.sql);
}

#[test]
fn take_last_without_order_is_a_syntax_violation() {
    let err = compile_err(&from("Order").take_last(3));
    assert!(matches!(err.kind(), ErrorKind::SyntaxViolation(_)));
}

#[test]
fn take_last_reverses_the_ordering() {
    let query = from("Order")
        .order_by(lambda("o", order(), o().get("Total", TypeRef::Decimal)))
        .take_last(2);
    let compilation = compile(&query);

    assert!(
        compilation.sql.ends_with("ORDER BY t0.\"total\" DESC LIMIT 2"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn reverse_flips_every_direction_once() {
    let query = from("Order")
        .order_by(lambda("o", order(), o().get("Total", TypeRef::Decimal)))
        .then_by_desc(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .reverse();
    let compilation = compile(&query);

    assert!(
        compilation
            .sql
            .ends_with("ORDER BY t0.\"total\" DESC, t0.\"id\""),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn first_forces_a_single_required_row() {
    let compilation = compile(&from("Order").first());

    assert!(compilation.sql.ends_with("LIMIT 1"), "got: {}", compilation.sql);
    assert!(compilation.required);
    assert!(compilation.missing_data_message.is_some());
    assert_eq!(None, compilation.default_value);
}

#[test]
fn first_or_default_installs_a_null_default() {
    let compilation = compile(&from("Order").first_or_default());

    assert!(!compilation.required);
    assert_eq!(Some(Value::Null), compilation.default_value);
}

#[test]
fn first_with_predicate_folds_into_where() {
    let query = from("Order").first_or_default_with(lambda(
        "o",
        order(),
        o().get("Status", TypeRef::Int32).eq(val(7)),
    ));
    let compilation = compile(&query);

    assert!(
        compilation.sql.contains("WHERE t0.\"status\" = @Status"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn element_at_beyond_an_earlier_take_is_a_range_violation() {
    let err = compile_err(&from("Order").take(3).element_at(4));
    assert!(matches!(err.kind(), ErrorKind::RangeViolation(_)));

    let query = from("Order")
        .order_by(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .take(3)
        .element_at(2);
    let compilation = compile(&query);
    assert!(
        compilation.sql.ends_with("LIMIT 1 OFFSET 2"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn shape_operators_after_the_projection_are_rejected() {
    let query = from("Order")
        .select(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))));
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::SyntaxViolation(_)));
}

#[test]
fn pagination_after_aggregation_is_rejected() {
    let query = from("Order").count().take(5);
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::SyntaxViolation(_)));
}

#[test]
fn bare_boolean_predicate_is_rejected() {
    let query = from("Order").filter(lambda("o", order(), val(true)));
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::SyntaxViolation(_)));
}

#[test]
fn unknown_entity_is_a_typed_error() {
    let err = compile_err(&from("Phantom"));
    assert!(matches!(err.kind(), ErrorKind::UnknownEntity(e) if e == "Phantom"));
}

#[test]
fn distinct_marks_the_projection() {
    let query = from("Order")
        .distinct()
        .select(lambda("o", order(), o().get("Status", TypeRef::Int32)));
    let compilation = compile(&query);

    assert_eq!("SELECT DISTINCT t0.\"status\" FROM \"orders\" t0", compilation.sql);
}

#[test]
fn outer_aliases_are_reused_inside_correlated_subqueries() {
    let inner = from("Order").any_matching(lambda(
        "d",
        order(),
        param("d", order())
            .get("Total", TypeRef::Decimal)
            .gt(o().get("Total", TypeRef::Decimal)),
    ));
    let query = from("Order").filter(lambda("o", order(), inner));
    let compilation = compile(&query);

    expect![[r#"SELECT t0."id", t0."status", t0."total", t0."name", t0."customer_id", t0."ship_date" FROM "orders" t0 WHERE EXISTS (SELECT 1 FROM "orders" t1 WHERE t1."total" > t0."total")"#]]
        .assert_eq(&compilation.sql);
}

#[test]
fn all_negates_the_predicate_inside_not_exists() {
    let item = TypeRef::entity("OrderItem");
    let inner = from("OrderItem").all_matching(lambda(
        "i",
        item.clone(),
        param("i", item).get("Price", TypeRef::Decimal).gt(val(0)),
    ));
    let query = from("Order").filter(lambda("o", order(), inner));
    let compilation = compile(&query);

    assert!(
        compilation
            .sql
            .contains("NOT EXISTS (SELECT 1 FROM \"order_items\" t1 WHERE t1.\"price\" <= @Price)"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn membership_batches_split_at_the_profile_ceiling() {
    let profile = DialectProfile::postgres().with_in_batch_ceiling(3);
    let list = val(vec![1, 2, 3, 4, 5, 6, 7]);
    let query = from("Order").filter(lambda(
        "o",
        order(),
        list.contains(o().get("Status", TypeRef::Int32)),
    ));
    let compilation = compile_on(&profile, &query);

    assert_eq!(3, compilation.sql.matches(" IN (").count(), "got: {}", compilation.sql);
    assert!(
        compilation.sql.contains("(t0.\"status\" IN (@Status, @Status1, @Status2) OR "),
        "got: {}",
        compilation.sql
    );
    assert_eq!(7, compilation.params.len());
}

#[test]
fn empty_membership_collapses_to_the_always_false_sentinel() {
    let list = val(Vec::<i32>::new());
    let query = from("Order").filter(lambda(
        "o",
        order(),
        list.contains(o().get("Status", TypeRef::Int32)),
    ));
    let compilation = compile(&query);

    assert!(compilation.sql.ends_with("WHERE 1 = 0"), "got: {}", compilation.sql);
    assert!(compilation.params.is_empty());
}

#[test]
fn negated_membership_dualizes_batches_and_sentinel() {
    let profile = DialectProfile::postgres().with_in_batch_ceiling(2);
    let list = val(vec![1, 2, 3]);
    let query = from("Order").filter(lambda(
        "o",
        order(),
        list.contains(o().get("Status", TypeRef::Int32)).not(),
    ));
    let compilation = compile_on(&profile, &query);
    assert!(
        compilation
            .sql
            .contains("(t0.\"status\" NOT IN (@Status, @Status1) AND t0.\"status\" NOT IN (@Status2))"),
        "got: {}",
        compilation.sql
    );

    let empty = from("Order").filter(lambda(
        "o",
        order(),
        val(Vec::<i32>::new())
            .contains(o().get("Status", TypeRef::Int32))
            .not(),
    ));
    let compilation = compile(&empty);
    assert!(compilation.sql.ends_with("WHERE 1 = 1"), "got: {}", compilation.sql);
}

#[test]
fn membership_over_a_query_becomes_an_in_subquery() {
    let customer = TypeRef::entity("Customer");
    let sub = from("Customer")
        .filter(lambda(
            "c",
            customer.clone(),
            param("c", customer.clone()).get("Region", TypeRef::Text).eq(val("west")),
        ))
        .select(lambda("c", customer.clone(), param("c", customer).get("Id", TypeRef::Int64)));
    let query = from("Order").filter(lambda(
        "o",
        order(),
        sub.contains(o().get("CustomerId", TypeRef::Int64)),
    ));
    let compilation = compile(&query);

    assert!(
        compilation.sql.contains(
            "WHERE t0.\"customer_id\" IN (SELECT t1.\"id\" FROM \"customers\" t1 WHERE t1.\"region\" = @Region)"
        ),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn repeated_equal_bindings_share_one_parameter() {
    let query = from("Order")
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))))
        .filter(lambda("x", order(), param("x", order()).get("Status", TypeRef::Int32).eq(val(1))));
    let compilation = compile(&query);

    assert!(
        compilation
            .sql
            .contains("WHERE t0.\"status\" = @Status AND t0.\"status\" = @Status"),
        "got: {}",
        compilation.sql
    );
    assert_eq!(1, compilation.params.len());
}

#[test]
fn simple_join_emits_an_inline_on_clause() {
    let customer = TypeRef::entity("Customer");
    let query = from("Order")
        .join(
            from("Customer"),
            lambda("o", order(), o().get("CustomerId", TypeRef::Int64)),
            lambda("c", customer.clone(), param("c", customer.clone()).get("Id", TypeRef::Int64)),
            lambda2(
                ("o", order()),
                ("c", customer.clone()),
                new_shape(vec![("o", o()), ("c", param("c", customer.clone()))]),
            ),
        )
        .filter(lambda(
            "r",
            TypeRef::Row,
            param("r", TypeRef::Row)
                .get("c", customer.clone())
                .get("Region", TypeRef::Text)
                .eq(val("west")),
        ))
        .select(lambda(
            "r",
            TypeRef::Row,
            new_shape(vec![
                ("Id", param("r", TypeRef::Row).get("o", order()).get("Id", TypeRef::Int64)),
                (
                    "Region",
                    param("r", TypeRef::Row).get("c", customer).get("Region", TypeRef::Text),
                ),
            ]),
        ));
    let compilation = compile(&query);

    expect![[r#"SELECT t0."id" AS "Id", t1."region" AS "Region" FROM "orders" t0 LEFT JOIN "customers" t1 ON t0."customer_id" = t1."id" WHERE t1."region" = @Region"#]]
        .assert_eq(&compilation.sql);
}

#[test]
fn shaped_join_sides_inline_as_subqueries() {
    let customer = TypeRef::entity("Customer");
    let shaped = from("Customer").filter(lambda(
        "c",
        customer.clone(),
        param("c", customer.clone()).get("Region", TypeRef::Text).eq(val("west")),
    ));
    let query = from("Order").join(
        shaped,
        lambda("o", order(), o().get("CustomerId", TypeRef::Int64)),
        lambda("c", customer.clone(), param("c", customer.clone()).get("Id", TypeRef::Int64)),
        lambda2(
            ("o", order()),
            ("c", customer.clone()),
            new_shape(vec![("o", o()), ("c", param("c", customer))]),
        ),
    );
    let compilation = compile(&query);

    assert!(
        compilation.sql.contains(
            "LEFT JOIN (SELECT t1.\"id\", t1.\"name\", t1.\"region\" FROM \"customers\" t1 \
             WHERE t1.\"region\" = @Region) t2 ON t0.\"customer_id\" = t2.\"id\""
        ),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn joins_demand_a_pure_left_side() {
    let customer = TypeRef::entity("Customer");
    let query = from("Order")
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))))
        .join(
            from("Customer"),
            lambda("o", order(), o().get("CustomerId", TypeRef::Int64)),
            lambda("c", customer.clone(), param("c", customer.clone()).get("Id", TypeRef::Int64)),
            lambda2(
                ("o", order()),
                ("c", customer.clone()),
                new_shape(vec![("o", o()), ("c", param("c", customer))]),
            ),
        );
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::SyntaxViolation(_)));
}

#[test]
fn grouping_captures_keys_and_reroutes_where_to_having() {
    let g = || param("g", TypeRef::sequence(TypeRef::Row));
    let query = from("Order")
        .group_by(lambda("o", order(), o().get("Status", TypeRef::Int32)))
        .filter(lambda(
            "g",
            TypeRef::sequence(TypeRef::Row),
            g().count().gt(val(5)),
        ))
        .select(lambda(
            "g",
            TypeRef::sequence(TypeRef::Row),
            new_shape(vec![
                ("Status", g().get("Key", TypeRef::Int32)),
                ("Cnt", g().count()),
                (
                    "Total",
                    g().sum(lambda("o", order(), o().get("Total", TypeRef::Decimal))),
                ),
            ]),
        ));
    let compilation = compile(&query);

    expect![[r#"SELECT t0."status" AS "Status", COUNT(*) AS "Cnt", SUM(t0."total") AS "Total" FROM "orders" t0 GROUP BY t0."status" HAVING COUNT(*) > @p"#]]
        .assert_eq(&compilation.sql);
}

#[test]
fn having_compares_against_the_captured_key_fragment() {
    let g = || param("g", TypeRef::sequence(TypeRef::Row));
    let query = from("Order")
        .group_by(lambda("o", order(), o().get("Status", TypeRef::Int32)))
        .filter(lambda(
            "g",
            TypeRef::sequence(TypeRef::Row),
            g().get("Key", TypeRef::Int32).eq(val(2)),
        ));
    let compilation = compile(&query);

    assert!(
        compilation.sql.contains("HAVING t0.\"status\" = @Key"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn grouped_count_with_predicate_is_a_conditional_aggregate() {
    let g = || param("g", TypeRef::sequence(TypeRef::Row));
    let query = from("Order")
        .group_by(lambda("o", order(), o().get("Status", TypeRef::Int32)))
        .select(lambda(
            "g",
            TypeRef::sequence(TypeRef::Row),
            new_shape(vec![(
                "Expensive",
                g().count_matching(lambda(
                    "o",
                    order(),
                    o().get("Total", TypeRef::Decimal).gt(val(100)),
                )),
            )]),
        ));
    let compilation = compile(&query);

    assert!(
        compilation
            .sql
            .contains("COUNT(CASE WHEN t0.\"total\" > @Total THEN 1 END) AS \"Expensive\""),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn composite_keys_group_by_each_fragment() {
    let g = || param("g", TypeRef::sequence(TypeRef::Row));
    let query = from("Order")
        .group_by(lambda(
            "o",
            order(),
            new_shape(vec![
                ("Status", o().get("Status", TypeRef::Int32)),
                ("CustomerId", o().get("CustomerId", TypeRef::Int64)),
            ]),
        ))
        .select(lambda(
            "g",
            TypeRef::sequence(TypeRef::Row),
            new_shape(vec![
                (
                    "Status",
                    g().get("Key", TypeRef::Row).get("Status", TypeRef::Int32),
                ),
                ("Cnt", g().count()),
            ]),
        ));
    let compilation = compile(&query);

    assert!(
        compilation
            .sql
            .contains("GROUP BY t0.\"status\", t0.\"customer_id\""),
        "got: {}",
        compilation.sql
    );
    assert!(
        compilation.sql.starts_with("SELECT t0.\"status\" AS \"Status\", COUNT(*) AS \"Cnt\""),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn terminal_count_folds_into_the_projection() {
    let query = from("Order")
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))))
        .count();
    let compilation = compile(&query);

    assert_eq!(
        "SELECT COUNT(*) FROM \"orders\" t0 WHERE t0.\"status\" = @Status",
        compilation.sql
    );
}

#[test]
fn paginated_count_wraps_the_inner_statement() {
    let query = from("Order").take(10).count();
    let compilation = compile(&query);

    assert!(
        compilation.sql.starts_with("SELECT COUNT(*) FROM (SELECT "),
        "got: {}",
        compilation.sql
    );
    assert!(compilation.sql.contains("LIMIT 10) t1"), "got: {}", compilation.sql);
}

#[test]
fn terminal_sum_uses_the_selector() {
    let query = from("Order").sum(lambda("o", order(), o().get("Total", TypeRef::Decimal)));
    let compilation = compile(&query);

    assert_eq!("SELECT SUM(t0.\"total\") FROM \"orders\" t0", compilation.sql);
}

#[test]
fn union_of_roots_joins_both_statements() {
    let query = from("Order")
        .select(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .union(
            from("ArchivedOrder").select(lambda(
                "a",
                TypeRef::entity("ArchivedOrder"),
                param("a", TypeRef::entity("ArchivedOrder")).get("Id", TypeRef::Int64),
            )),
        );
    let compilation = compile(&query);

    assert_eq!(
        "SELECT t0.\"id\" FROM \"orders\" t0 UNION SELECT t1.\"id\" FROM \"archived_orders\" t1",
        compilation.sql
    );
}

#[test]
fn concat_is_union_all() {
    let query = from("Order")
        .select(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .union_all(
            from("ArchivedOrder").select(lambda(
                "a",
                TypeRef::entity("ArchivedOrder"),
                param("a", TypeRef::entity("ArchivedOrder")).get("Id", TypeRef::Int64),
            )),
        );
    let compilation = compile(&query);

    assert!(compilation.sql.contains(" UNION ALL "), "got: {}", compilation.sql);
}

#[test]
fn mid_chain_combination_wraps_as_a_table_source() {
    let query = from("Order")
        .union(from("ArchivedOrder"))
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))));
    let compilation = compile(&query);

    expect![[r#"SELECT t2.* FROM (SELECT t0."id", t0."status", t0."total", t0."name", t0."customer_id", t0."ship_date" FROM "orders" t0 UNION SELECT t1."id", t1."status", t1."total", t1."name", t1."customer_id", t1."ship_date" FROM "archived_orders" t1) t2 WHERE t2."status" = @Status"#]]
        .assert_eq(&compilation.sql);
}

#[test]
fn combination_sides_must_agree_on_arity() {
    let query = from("Order")
        .select(lambda("o", order(), o().get("Id", TypeRef::Int64)))
        .union(from("Customer"));
    let err = compile_err(&query);

    assert!(matches!(err.kind(), ErrorKind::TypeAccessInvalid(_)));
}

#[test]
fn cast_narrows_the_projected_field_set() {
    let query = from("Order").cast_to("OrderSummary");
    let compilation = compile(&query);

    assert_eq!("SELECT t0.\"id\", t0.\"total\" FROM \"orders\" t0", compilation.sql);
}

#[test]
fn cast_with_no_overlap_has_no_queryable_fields() {
    let err = compile_err(&from("Order").cast_to("Ledger"));
    assert!(matches!(err.kind(), ErrorKind::NoQueryableFields(_)));
}

#[test]
fn skip_while_inverts_the_predicate() {
    let query = from("Order").skip_while(lambda(
        "o",
        order(),
        o().get("Status", TypeRef::Int32).eq(val(1)),
    ));
    let compilation = compile(&query);

    assert!(
        compilation.sql.contains("WHERE t0.\"status\" <> @Status"),
        "got: {}",
        compilation.sql
    );
}

#[test]
fn timeout_is_carried_through_as_metadata() {
    let query = from("Order").with_timeout(30);
    let compilation = compile(&query);

    assert_eq!(Some(30), compilation.timeout);
    assert!(!compilation.sql.contains("30"), "got: {}", compilation.sql);
}

#[test]
fn oracle_pagination_nests_rownum_wrappers() {
    let query = from("Order")
        .filter(lambda("o", order(), o().get("Status", TypeRef::Int32).eq(val(1))))
        .order_by(lambda("o", order(), o().get("Total", TypeRef::Decimal)))
        .skip(5)
        .take(10);
    let compilation = compile_on(&DialectProfile::oracle(), &query);

    assert!(
        compilation.sql.starts_with("SELECT * FROM (SELECT inr_.*, ROWNUM rnum_ FROM (SELECT "),
        "got: {}",
        compilation.sql
    );
    assert!(
        compilation.sql.ends_with("WHERE ROWNUM <= 15) WHERE rnum_ > 5"),
        "got: {}",
        compilation.sql
    );
    assert!(compilation.sql.contains(":Status"), "got: {}", compilation.sql);
}

#[test]
fn mysql_quotes_with_backticks_and_concatenates_with_concat() {
    let query = from("Order").select(lambda(
        "o",
        order(),
        o().get("Name", TypeRef::Text).concat(o().get("Name", TypeRef::Text)),
    ));
    let compilation = compile_on(&DialectProfile::mysql(), &query);

    assert_eq!(
        "SELECT CONCAT(t0.`name`, t0.`name`) FROM `orders` t0",
        compilation.sql
    );
}

#[test]
fn sybase_take_emits_top_and_skip_is_unsupported() {
    let take = from("Order").take(5);
    let compilation = compile_on(&DialectProfile::sybase(), &take);
    assert!(compilation.sql.starts_with("SELECT TOP 5 "), "got: {}", compilation.sql);

    let skip = from("Order").skip(5);
    let err = Compiler::new(&DialectProfile::sybase(), &*SCHEMA)
        .compile(&skip)
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UnsupportedOperator(_)));
}
