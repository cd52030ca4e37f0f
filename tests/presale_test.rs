mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use textbook_orders::{
    errors::ServiceError,
    models::{
        FulfillmentSource, FulfillmentStatus, ItemStatus, LinkStatus, OrderRuleViolation,
        Order, OrderStatus, SuggestionStatus, SyncState,
    },
    services::orders::{CancelOrderRequest, SelectItemRequest, SubmitOrderRequest},
};
use uuid::Uuid;

use common::{board_config, TestApp, ORDERS_BOARD, READY_LABEL};

fn presale_app() -> TestApp {
    let app = TestApp::with_board(board_config());
    app.add_book("MAT3", "Matemáticas 3", dec!(25.00), "3", 10);
    app.add_book("LEN3", "Lengua y Literatura 3", dec!(18.50), "3", 10);
    app
}

/// Puts a pre-sale item on the orders board, flagged ready for import.
fn seed_presale(app: &TestApp, student: &str, grade: &str, rows: Vec<(&str, Value)>) -> String {
    app.board.seed_item(
        ORDERS_BOARD,
        &format!("Preventa {}", student),
        json!({
            "text_student": student,
            "text_grade": grade,
            "status_import": { "label": READY_LABEL },
        }),
        rows,
    )
}

async fn import_one(app: &TestApp, student: &str, grade: &str) -> Uuid {
    seed_presale(
        app,
        student,
        grade,
        vec![("Matemáticas 3", json!({ "text_code": "MAT3" }))],
    );
    let report = app.services.presale.import(&app.admin()).await.expect("import");
    assert_eq!(report.imported, 1);
    report.order_ids[0]
}

#[tokio::test]
async fn import_builds_awaiting_link_orders() {
    let app = presale_app();
    let item_id = seed_presale(
        &app,
        "Juan Perez",
        "3er grado",
        vec![
            ("Matemáticas 3", json!({ "text_code": "MAT3", "numbers_qty": "2" })),
            ("Lengua y Literatura", json!({})),
            ("Diccionario Escolar", json!({ "text_code": "DIC-01" })),
        ],
    );
    app.board.seed_item(
        ORDERS_BOARD,
        "Pedido normal",
        json!({ "status_import": { "label": "Importado" } }),
        vec![],
    );

    let report = app.services.presale.import(&app.admin()).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.imported, 1);
    assert_eq!(report.already_imported, 0);
    assert_eq!(report.unmatched_books, 1);
    assert!(report.errors.is_empty());

    let order = app
        .services
        .orders
        .get_order(&app.admin(), report.order_ids[0])
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingLink);
    assert_eq!(order.link_status, Some(LinkStatus::Unlinked));
    assert_eq!(order.student_id, None);
    assert_eq!(order.user_id, None);
    assert_eq!(order.student_name, "Juan Perez");
    assert_eq!(order.grade, "3er grado");
    assert_eq!(order.items.len(), 2);
    assert!(order.items.iter().all(|i| i.status == ItemStatus::Ordered));
    assert!(order
        .items
        .iter()
        .all(|i| i.fulfillment_source == Some(FulfillmentSource::Import)));
    assert_eq!(order.total, dec!(68.50));
    assert_eq!(order.board_item_ids, vec![item_id.clone()]);
    assert_eq!(order.submissions.len(), 1);
    assert_eq!(order.submissions[0].board_sync, SyncState::Synced);

    let presale = order.presale.as_ref().unwrap();
    assert_eq!(presale.source_board_item_id, item_id);
    assert_eq!(presale.unmatched_books, vec!["Diccionario Escolar".to_string()]);

    let changes = app.board.column_changes();
    assert_eq!(
        changes,
        vec![(
            item_id.clone(),
            "status_import".to_string(),
            json!({ "label": "Importado" })
        )]
    );
}

#[tokio::test]
async fn import_is_idempotent_per_board_item() {
    let app = presale_app();
    let item_id = seed_presale(
        &app,
        "Juan Perez",
        "3",
        vec![("Matemáticas 3", json!({ "text_code": "MAT3" }))],
    );
    let first = app.services.presale.import(&app.admin()).await.unwrap();
    assert_eq!(first.imported, 1);

    let second = app.services.presale.import(&app.admin()).await.unwrap();
    assert_eq!(second.scanned, 0);

    app.board
        .set_item_column(&item_id, "status_import", json!({ "label": READY_LABEL }));
    let third = app.services.presale.import(&app.admin()).await.unwrap();
    assert_eq!(third.scanned, 1);
    assert_eq!(third.imported, 0);
    assert_eq!(third.already_imported, 1);
    assert_eq!(app.orders.len(), 1);
}

#[tokio::test]
async fn import_is_admin_only_and_needs_the_board() {
    let app = presale_app();
    let err = app
        .services
        .presale
        .import(&textbook_orders::models::Actor::user(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));

    let offline = TestApp::new();
    let err = offline.services.presale.import(&offline.admin()).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn imported_lines_follow_board_status_changes() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    let order = app.services.orders.get_order(&app.admin(), order_id).await.unwrap();
    let subitem_id = order.items[0].board_subitem_id.clone().unwrap();

    let response = app
        .services
        .board
        .handle_webhook(&json!({ "event": { "pulseId": subitem_id, "value": "Entregado" } }))
        .await;
    assert_eq!(response["processed"], json!(true));

    let order = app.services.orders.get_order(&app.admin(), order_id).await.unwrap();
    assert_eq!(order.items[0].fulfillment, Some(FulfillmentStatus::Delivered));
}

#[tokio::test]
async fn suggestions_pair_similar_names_in_the_same_grade() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3er grado").await;
    let student = app.enroll("Juan Pérez Gómez", "3");
    let presale = &app.services.presale;

    let suggestion = presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .expect("suggestion");
    assert_eq!(suggestion.order_id, order_id);
    assert_eq!(suggestion.user_id, student.user_id);
    assert_eq!(suggestion.status, SuggestionStatus::Pending);
    assert_eq!(suggestion.board_student_name, "Juan Perez");
    assert_eq!(suggestion.score, 0.95);

    let again = presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, suggestion.id);
    assert_eq!(presale.list_pending_suggestions(&app.admin()).await.unwrap().len(), 1);

    let rejected = presale
        .reject_suggestion(&app.admin(), suggestion.id)
        .await
        .unwrap();
    assert_eq!(rejected.status, SuggestionStatus::Rejected);
    assert!(presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .is_none());
    assert!(presale.list_pending_suggestions(&app.admin()).await.unwrap().is_empty());

    let err = presale
        .reject_suggestion(&app.admin(), suggestion.id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn a_better_import_outranks_an_earlier_suggestion() {
    let app = presale_app();
    import_one(&app, "Juan Perez", "3").await;
    let student = app.enroll("Juan Pérez Gómez", "3");
    let presale = &app.services.presale;

    let earlier = presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(earlier.score, 0.95);

    let better_id = import_one(&app, "Juan Perez Gomez", "3").await;
    let better = presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .expect("suggestion for the closer name");
    assert_ne!(better.id, earlier.id);
    assert_eq!(better.order_id, better_id);
    assert_eq!(better.score, 1.0);

    // The stronger pair is now the one handed back.
    let again = presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, better.id);
}

#[tokio::test]
async fn a_new_tie_withholds_the_earlier_suggestion() {
    let app = presale_app();
    import_one(&app, "Juan Perez", "3").await;
    let student = app.enroll("Juan Perez", "3");
    let presale = &app.services.presale;
    presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .unwrap();

    import_one(&app, "Juan Pérez", "3ro").await;
    assert!(presale
        .suggest_for_student(&app.admin(), student.student_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(app.suggestions.all().len(), 1);
}

#[tokio::test]
async fn no_suggestion_for_ties_other_grades_or_weak_names() {
    let app = presale_app();
    import_one(&app, "Ana Lopez", "3").await;
    import_one(&app, "Ana López", "3ro").await;
    import_one(&app, "Pedro Ruiz", "3").await;
    let ana = app.enroll("Ana López", "3");
    let pedro = app.enroll("Pedro Ruiz", "4");
    let carla = app.enroll("Carla Méndez", "3");
    let presale = &app.services.presale;

    assert!(presale
        .suggest_for_student(&app.admin(), ana.student_id)
        .await
        .unwrap()
        .is_none());
    assert!(presale
        .suggest_for_student(&app.admin(), pedro.student_id)
        .await
        .unwrap()
        .is_none());
    assert!(presale
        .suggest_for_student(&app.admin(), carla.student_id)
        .await
        .unwrap()
        .is_none());
    assert!(app.suggestions.all().is_empty());
}

#[tokio::test]
async fn confirming_links_the_order_and_closes_competing_suggestions() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    let juan = app.enroll("Juan Pérez Gómez", "3");
    let other = app.enroll("Juan Perez", "3");
    let presale = &app.services.presale;

    let for_juan = presale
        .suggest_for_student(&app.admin(), juan.student_id)
        .await
        .unwrap()
        .unwrap();
    let for_other = presale
        .suggest_for_student(&app.admin(), other.student_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(for_other.score, 1.0);

    let linked = presale.confirm_suggestion(&app.admin(), for_juan.id).await.unwrap();
    assert_eq!(linked.id, order_id);
    assert_eq!(linked.status, OrderStatus::Submitted);
    assert_eq!(linked.link_status, Some(LinkStatus::Linked));
    assert_eq!(linked.student_id, Some(juan.student_id));
    assert_eq!(linked.user_id, Some(juan.user_id));
    assert_eq!(linked.student_name, "Juan Pérez Gómez");
    assert_eq!(linked.grade, "3");

    let statuses: Vec<(Uuid, SuggestionStatus)> = app
        .suggestions
        .all()
        .into_iter()
        .map(|s| (s.id, s.status))
        .collect();
    assert!(statuses.contains(&(for_juan.id, SuggestionStatus::Confirmed)));
    assert!(statuses.contains(&(for_other.id, SuggestionStatus::Rejected)));
    assert!(presale.list_unlinked_orders(&app.admin()).await.unwrap().is_empty());

    let from_parent = app
        .services
        .orders
        .get_or_create(&juan.actor(), juan.student_id)
        .await
        .unwrap();
    assert_eq!(from_parent.id, order_id);
    assert_eq!(
        from_parent.items.iter().filter(|i| i.status == ItemStatus::Ordered).count(),
        1
    );
}

#[tokio::test]
async fn linking_replaces_an_untouched_draft() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    let student = app.enroll("Juan Perez", "3");
    let draft = app
        .services
        .orders
        .get_or_create(&student.actor(), student.student_id)
        .await
        .unwrap();

    let linked = app
        .services
        .presale
        .link_order(&app.admin(), order_id, student.student_id)
        .await
        .unwrap();
    assert_eq!(linked.link_status, Some(LinkStatus::Linked));

    let draft = app.services.orders.get_order(&app.admin(), draft.id).await.unwrap();
    assert_eq!(draft.status, OrderStatus::Cancelled);
    assert_eq!(
        draft.cancel_reason,
        Some(format!("Replaced by pre-sale order {}", order_id))
    );

    let current = app
        .services
        .orders
        .student_order(student.student_id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.order_id, order_id);

    let err = app
        .services
        .presale
        .link_order(&app.admin(), order_id, student.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::AlreadyLinked(_)));
}

/// The order a parent sees first: an untouched draft.
async fn fresh_draft(app: &TestApp, student: &common::Student) -> Order {
    app.services
        .orders
        .get_or_create(&student.actor(), student.student_id)
        .await
        .unwrap()
}

async fn assert_draft_untouched(app: &TestApp, draft: &Order) {
    let current = app.services.orders.get_order(&app.admin(), draft.id).await.unwrap();
    assert_eq!(current.status, OrderStatus::Draft);
    assert_eq!(current.version, draft.version);
    assert_eq!(current.cancel_reason, None);
}

#[tokio::test]
async fn relinking_a_linked_order_keeps_the_other_draft() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    let juan = app.enroll("Juan Perez", "3");
    let rosa = app.enroll("Rosa Díaz", "3");
    app.services
        .presale
        .link_order(&app.admin(), order_id, juan.student_id)
        .await
        .unwrap();
    let draft = fresh_draft(&app, &rosa).await;

    let err = app
        .services
        .presale
        .link_order(&app.admin(), order_id, rosa.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::AlreadyLinked(_)));

    assert_draft_untouched(&app, &draft).await;
    let linked = app.services.orders.get_order(&app.admin(), order_id).await.unwrap();
    assert_eq!(linked.student_id, Some(juan.student_id));
}

#[tokio::test]
async fn linking_a_regular_order_keeps_the_draft() {
    let app = presale_app();
    let owner = app.enroll("Juan Perez", "3");
    let rosa = app.enroll("Rosa Díaz", "3");
    let regular = fresh_draft(&app, &owner).await;
    let draft = fresh_draft(&app, &rosa).await;

    let err = app
        .services
        .presale
        .link_order(&app.admin(), regular.id, rosa.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::NotPreSale(_)));

    assert_draft_untouched(&app, &draft).await;
    assert_draft_untouched(&app, &regular).await;
}

#[tokio::test]
async fn linking_a_cancelled_presale_keeps_the_draft() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    app.services
        .orders
        .cancel_order(
            &app.admin(),
            order_id,
            CancelOrderRequest {
                reason: Some("duplicado en el tablero".to_string()),
            },
        )
        .await
        .unwrap();
    let student = app.enroll("Juan Perez", "3");
    let draft = fresh_draft(&app, &student).await;

    let err = app
        .services
        .presale
        .link_order(&app.admin(), order_id, student.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::OrderCancelled(_)));

    assert_draft_untouched(&app, &draft).await;
}

#[tokio::test]
async fn linking_refuses_to_replace_committed_books() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3").await;
    let student = app.enroll("Juan Perez", "3");
    let actor = student.actor();
    let draft = app
        .services
        .orders
        .get_or_create(&actor, student.student_id)
        .await
        .unwrap();
    let book_id = draft.items[0].book_id;
    app.services
        .orders
        .select(&actor, draft.id, book_id, SelectItemRequest { quantity: 1 })
        .await
        .unwrap();
    app.services
        .orders
        .submit(&actor, draft.id, SubmitOrderRequest::default())
        .await
        .unwrap();

    let err = app
        .services
        .presale
        .link_order(&app.admin(), order_id, student.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let untouched = app.services.orders.get_order(&app.admin(), order_id).await.unwrap();
    assert_eq!(untouched.status, OrderStatus::AwaitingLink);
}

#[tokio::test]
async fn unlinking_returns_the_order_to_the_queue() {
    let app = presale_app();
    let order_id = import_one(&app, "Juan Perez", "3er grado").await;
    let student = app.enroll("Juan Pérez", "3");
    let presale = &app.services.presale;
    presale
        .link_order(&app.admin(), order_id, student.student_id)
        .await
        .unwrap();

    let unlinked = presale.unlink_order(&app.admin(), order_id).await.unwrap();
    assert_eq!(unlinked.status, OrderStatus::AwaitingLink);
    assert_eq!(unlinked.link_status, Some(LinkStatus::Unlinked));
    assert_eq!(unlinked.student_id, None);
    assert_eq!(unlinked.student_name, "Juan Perez");
    assert_eq!(unlinked.grade, "3er grado");

    let queue = presale.list_unlinked_orders(&app.admin()).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, order_id);

    let err = presale.unlink_order(&app.admin(), order_id).await.unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::NotLinked(_)));
}

#[tokio::test]
async fn only_imported_orders_can_be_linked() {
    let app = presale_app();
    let student = app.enroll("Juan Perez", "3");
    let other = app.enroll("Rosa Díaz", "3");
    let draft = app
        .services
        .orders
        .get_or_create(&student.actor(), student.student_id)
        .await
        .unwrap();

    let err = app
        .services
        .presale
        .link_order(&app.admin(), draft.id, other.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderRule(OrderRuleViolation::NotPreSale(_)));

    let err = app
        .services
        .presale
        .link_order(&app.admin(), Uuid::new_v4(), other.student_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
