#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use textbook_orders::{
    app_router,
    auth::{AuthService, ADMIN_ROLE},
    board::{BoardClient, BoardError, BoardItem, BoardSubitem, BoardUpdate, ColumnValue},
    config::{
        AppConfig, BoardConfig, InventoryBoardConfig, OrderColumnMapping, PreSaleImportConfig,
        SubitemColumnMapping,
    },
    handlers::{AppServices, Stores},
    models::{Actor, CatalogItem, Enrollment, EnrollmentStatus, UserIdentity},
    repositories::{
        InMemoryCatalog, InMemoryEnrollments, InMemoryOrderStore, InMemorySuggestionStore,
        InMemoryUsers,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-secret-with-enough-length-0123456789";
pub const SCHOOL_YEAR: i32 = 2026;
pub const ORDERS_BOARD: &str = "5001";
pub const INVENTORY_BOARD: &str = "6001";
pub const READY_LABEL: &str = "Listo para importar";

/// Board settings used by tests that exercise the integration.
pub fn board_config() -> BoardConfig {
    BoardConfig {
        enabled: true,
        api_token: "test-token".to_string(),
        orders_board_id: ORDERS_BOARD.to_string(),
        orders_group_id: Some("topics".to_string()),
        columns: OrderColumnMapping {
            student: Some("text_student".to_string()),
            grade: Some("text_grade".to_string()),
            guardian: Some("text_guardian".to_string()),
            total: Some("numbers_total".to_string()),
            status: Some("status".to_string()),
            ..Default::default()
        },
        subitem_columns: SubitemColumnMapping {
            code: Some("text_code".to_string()),
            quantity: Some("numbers_qty".to_string()),
            price: Some("numbers_price".to_string()),
            status: Some("status_sub".to_string()),
        },
        submitted_label: Some("Pedido recibido".to_string()),
        presale: PreSaleImportConfig {
            trigger_column: Some("status_import".to_string()),
            student_column: Some("text_student".to_string()),
            grade_column: Some("text_grade".to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn board_config_with_inventory() -> BoardConfig {
    BoardConfig {
        inventory: Some(InventoryBoardConfig {
            board_id: INVENTORY_BOARD.to_string(),
            group_id: None,
            code_column: "text_code".to_string(),
            subitem_quantity_column: Some("numbers_qty".to_string()),
            subitem_student_column: Some("text_student".to_string()),
        }),
        ..board_config()
    }
}

// ==================== Fake board ====================

#[derive(Debug, Clone)]
pub struct FakeSubitem {
    pub id: String,
    pub name: String,
    pub columns: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: String,
    pub board_id: String,
    pub group_id: Option<String>,
    pub name: String,
    pub columns: Map<String, Value>,
    pub subitems: Vec<FakeSubitem>,
}

#[derive(Debug, Default)]
struct FakeBoardState {
    next_id: u64,
    items: Vec<FakeItem>,
    updates: Vec<BoardUpdate>,
    column_changes: Vec<(String, String, Value)>,
    fail_create_item: bool,
    fail_subitems_named: Vec<String>,
    fail_reads: bool,
}

impl FakeBoardState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (1000 + self.next_id).to_string()
    }
}

/// Text the board would show for a raw column value.
fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => ["label", "text", "email", "date"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(String::from),
        _ => None,
    }
}

fn column_values(columns: &Map<String, Value>) -> Vec<ColumnValue> {
    columns
        .iter()
        .map(|(id, value)| ColumnValue {
            id: id.clone(),
            text: display_text(value),
            value: Some(value.to_string()),
        })
        .collect()
}

fn as_columns(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

impl FakeItem {
    fn to_board_item(&self) -> BoardItem {
        BoardItem {
            id: self.id.clone(),
            name: self.name.clone(),
            column_values: column_values(&self.columns),
            subitems: self
                .subitems
                .iter()
                .map(|s| BoardSubitem {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    column_values: column_values(&s.columns),
                })
                .collect(),
        }
    }

    pub fn column_text(&self, column: &str) -> Option<String> {
        self.columns.get(column).and_then(display_text)
    }
}

/// Stateful in-process stand-in for the board API.
#[derive(Debug, Default)]
pub struct FakeBoard {
    state: Mutex<FakeBoardState>,
}

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts an item on a board as if a person had entered it.
    pub fn seed_item(
        &self,
        board_id: &str,
        name: &str,
        columns: Value,
        subitems: Vec<(&str, Value)>,
    ) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let subitems = subitems
            .into_iter()
            .map(|(name, columns)| FakeSubitem {
                id: state.next_id(),
                name: name.to_string(),
                columns: as_columns(Some(&columns)),
            })
            .collect();
        state.items.push(FakeItem {
            id: id.clone(),
            board_id: board_id.to_string(),
            group_id: None,
            name: name.to_string(),
            columns: as_columns(Some(&columns)),
            subitems,
        });
        id
    }

    pub fn items_on(&self, board_id: &str) -> Vec<FakeItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .filter(|item| item.board_id == board_id)
            .cloned()
            .collect()
    }

    pub fn item(&self, item_id: &str) -> Option<FakeItem> {
        self.state
            .lock()
            .unwrap()
            .items
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
    }

    pub fn set_item_column(&self, item_id: &str, column: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.items.iter_mut().find(|item| item.id == item_id) {
            item.columns.insert(column.to_string(), value);
        }
    }

    pub fn set_subitem_column(&self, subitem_id: &str, column: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        for item in state.items.iter_mut() {
            if let Some(subitem) = item.subitems.iter_mut().find(|s| s.id == subitem_id) {
                subitem.columns.insert(column.to_string(), value);
                return;
            }
        }
    }

    pub fn updates_on(&self, item_id: &str) -> Vec<BoardUpdate> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|u| u.item_id == item_id)
            .cloned()
            .collect()
    }

    pub fn column_changes(&self) -> Vec<(String, String, Value)> {
        self.state.lock().unwrap().column_changes.clone()
    }

    pub fn fail_create_item(&self, fail: bool) {
        self.state.lock().unwrap().fail_create_item = fail;
    }

    pub fn fail_subitem(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_subitems_named
            .push(name.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_create_item = false;
        state.fail_subitems_named.clear();
        state.fail_reads = false;
    }
}

#[async_trait]
impl BoardClient for FakeBoard {
    async fn create_item(
        &self,
        board_id: &str,
        group_id: Option<&str>,
        item_name: &str,
        column_values: &Value,
    ) -> Result<String, BoardError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_item {
            return Err(BoardError::Status {
                status: 500,
                body: "board is down".to_string(),
            });
        }
        let id = state.next_id();
        state.items.push(FakeItem {
            id: id.clone(),
            board_id: board_id.to_string(),
            group_id: group_id.map(String::from),
            name: item_name.to_string(),
            columns: as_columns(Some(column_values)),
            subitems: Vec::new(),
        });
        Ok(id)
    }

    async fn create_subitem(
        &self,
        parent_item_id: &str,
        item_name: &str,
        column_values: Option<&Value>,
    ) -> Result<String, BoardError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subitems_named.iter().any(|n| n == item_name) {
            return Err(BoardError::GraphQl(format!("cannot create {}", item_name)));
        }
        let id = state.next_id();
        let parent = state
            .items
            .iter_mut()
            .find(|item| item.id == parent_item_id)
            .ok_or_else(|| BoardError::GraphQl(format!("no item {}", parent_item_id)))?;
        parent.subitems.push(FakeSubitem {
            id: id.clone(),
            name: item_name.to_string(),
            columns: as_columns(column_values),
        });
        Ok(id)
    }

    async fn create_update(&self, item_id: &str, body: &str) -> Result<String, BoardError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.updates.push(BoardUpdate {
            id: id.clone(),
            item_id: item_id.to_string(),
            body: body.to_string(),
            text_body: Some(body.to_string()),
            created_at: None,
            creator_name: Some("API".to_string()),
        });
        Ok(id)
    }

    async fn items(&self, ids: &[String]) -> Result<Vec<BoardItem>, BoardError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(BoardError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .map(FakeItem::to_board_item)
            .collect())
    }

    async fn find_items_by_column(
        &self,
        board_id: &str,
        column_id: &str,
        value: &str,
    ) -> Result<Vec<BoardItem>, BoardError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(BoardError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(state
            .items
            .iter()
            .filter(|item| {
                item.board_id == board_id && item.column_text(column_id).as_deref() == Some(value)
            })
            .map(FakeItem::to_board_item)
            .collect())
    }

    async fn change_column_value(
        &self,
        board_id: &str,
        item_id: &str,
        column_id: &str,
        value: &Value,
    ) -> Result<(), BoardError> {
        let mut state = self.state.lock().unwrap();
        state
            .column_changes
            .push((item_id.to_string(), column_id.to_string(), value.clone()));
        let item = state
            .items
            .iter_mut()
            .find(|item| item.id == item_id && item.board_id == board_id)
            .ok_or_else(|| BoardError::GraphQl(format!("no item {}", item_id)))?;
        item.columns.insert(column_id.to_string(), value.clone());
        Ok(())
    }

    async fn updates(&self, item_ids: &[String]) -> Result<Vec<BoardUpdate>, BoardError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .updates
            .iter()
            .filter(|u| item_ids.contains(&u.item_id))
            .cloned()
            .collect())
    }
}

// ==================== Application harness ====================

/// An enrolled student and the account that owns them.
#[derive(Debug, Clone, Copy)]
pub struct Student {
    pub student_id: Uuid,
    pub user_id: Uuid,
}

impl Student {
    pub fn actor(&self) -> Actor {
        Actor::user(self.user_id)
    }
}

/// Application state wired to in-memory stores and a fake board.
pub struct TestApp {
    pub orders: Arc<InMemoryOrderStore>,
    pub suggestions: Arc<InMemorySuggestionStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub enrollments: Arc<InMemoryEnrollments>,
    pub users: Arc<InMemoryUsers>,
    pub board: Arc<FakeBoard>,
    pub services: AppServices,
    pub state: AppState,
    pub admin_id: Uuid,
    router: Router,
}

impl TestApp {
    /// Board integration switched off.
    pub fn new() -> Self {
        Self::with_board(BoardConfig::default())
    }

    pub fn with_board(board_config: BoardConfig) -> Self {
        let orders = Arc::new(InMemoryOrderStore::new());
        let suggestions = Arc::new(InMemorySuggestionStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let enrollments = Arc::new(InMemoryEnrollments::new());
        let users = Arc::new(InMemoryUsers::new());
        let board = Arc::new(FakeBoard::new());

        let stores = Stores {
            orders: orders.clone(),
            suggestions: suggestions.clone(),
            catalog: catalog.clone(),
            enrollments: enrollments.clone(),
            users: users.clone(),
        };
        let client: Arc<dyn BoardClient> = board.clone();
        let services = AppServices::new(stores, Some(client), board_config.clone(), SCHOOL_YEAR);

        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: JWT_SECRET.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            auto_migrate: false,
            school_year: Some(SCHOOL_YEAR),
            board: board_config,
        };
        let state = AppState {
            db: None,
            config,
            services: services.clone(),
            auth: Arc::new(AuthService::new(JWT_SECRET)),
        };
        let router = app_router(state.clone());

        Self {
            orders,
            suggestions,
            catalog,
            enrollments,
            users,
            board,
            services,
            state,
            admin_id: Uuid::new_v4(),
            router,
        }
    }

    pub fn admin(&self) -> Actor {
        Actor::admin(self.admin_id)
    }

    /// Adds an active, restricted-catalog book for `grade`.
    pub fn add_book(
        &self,
        code: &str,
        name: &str,
        price: Decimal,
        grade: &str,
        stock: i32,
    ) -> CatalogItem {
        let book = CatalogItem {
            book_id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            price,
            grade: Some(grade.to_string()),
            grades: Vec::new(),
            inventory_quantity: stock,
            reserved_quantity: 0,
            active: true,
            restricted_catalog: true,
        };
        self.catalog.upsert(book.clone());
        book
    }

    /// Approved enrollment for the current school year, with a new owning account.
    pub fn enroll(&self, student_name: &str, grade: &str) -> Student {
        self.enroll_for(Uuid::new_v4(), student_name, grade, EnrollmentStatus::Approved)
    }

    pub fn enroll_for(
        &self,
        user_id: Uuid,
        student_name: &str,
        grade: &str,
        status: EnrollmentStatus,
    ) -> Student {
        let student = Student {
            student_id: Uuid::new_v4(),
            user_id,
        };
        self.enrollments.upsert(Enrollment {
            student_id: student.student_id,
            user_id,
            student_name: student_name.to_string(),
            grade: grade.to_string(),
            school_year: SCHOOL_YEAR,
            status,
        });
        self.users.upsert(UserIdentity {
            user_id,
            display_name: format!("Familia de {}", student_name),
            email: Some(format!("{}@example.com", user_id.simple())),
        });
        student
    }

    pub fn token_for(&self, user_id: Uuid, admin: bool) -> String {
        let roles = if admin {
            vec![ADMIN_ROLE.to_string()]
        } else {
            Vec::new()
        };
        self.state
            .auth
            .issue_token(user_id, Some("Test User".to_string()), roles)
            .expect("issue test token")
    }

    pub fn admin_token(&self) -> String {
        self.token_for(self.admin_id, true)
    }

    /// Sends a request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request")
    }

    pub async fn request_raw(&self, method: Method, uri: &str, body: &'static str) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
