use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use garage_ledger::api::{app_state, create_router, ApiSettings};
use garage_ledger::logic::hash_token;
use garage_ledger::store::SessionStore;
use garage_ledger::{MemoryStore, Session};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    create_router(app_state(MemoryStore::new(), ApiSettings::default()))
}

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Reply {
        status,
        cookie,
        body,
    }
}

/// Registers a shop and returns (admin cookie, branch id).
async fn register(app: &Router, shop: &str, username: &str) -> (String, String) {
    let reply = send(
        app,
        Method::POST,
        "/tenants",
        None,
        Some(json!({
            "shop_name": shop,
            "admin": {"username": username, "password": "admin-pass"}
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["branch"]["name"], "Main");
    let branch_id = reply.body["branch"]["id"].as_str().unwrap().to_string();

    let cookie = login(app, username, "admin-pass").await;
    (cookie, branch_id)
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let reply = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"username": username, "password": password})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.cookie.expect("login sets a session cookie")
}

async fn create_product(app: &Router, cookie: &str, name: &str, opening_stock: i32) -> Value {
    let reply = send(
        app,
        Method::POST,
        "/products",
        Some(cookie),
        Some(json!({
            "name": name,
            "cost_price": "40.00",
            "selling_price": "65.00",
            "reorder_level": 3,
            "opening_stock": opening_stock
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.body
}

async fn stock_of(app: &Router, cookie: &str, product_id: &str) -> i64 {
    let reply = send(
        app,
        Method::GET,
        &format!("/products/{}", product_id),
        Some(cookie),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    reply.body["stock_quantity"].as_i64().unwrap()
}

#[tokio::test]
async fn test_protected_routes_need_a_session() {
    let app = app();
    let reply = send(&app, Method::GET, "/job-orders", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let reply = send(
        &app,
        Method::GET,
        "/job-orders",
        Some("garage_session=not-a-real-token"),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let health = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(health.status, StatusCode::OK);
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let app = app();
    register(&app, "First Garage", "owner").await;
    let reply = send(
        &app,
        Method::POST,
        "/tenants",
        None,
        Some(json!({
            "shop_name": "Second Garage",
            "admin": {"username": "OWNER", "password": "admin-pass"}
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_staff_cannot_manage_stock_but_can_issue() {
    let app = app();
    let (admin, branch_id) = register(&app, "Role Garage", "role-admin").await;
    let product = create_product(&app, &admin, "Spark plug", 10).await;
    assert_eq!(product["sku"], "SKU-00001");
    let product_id = product["id"].as_str().unwrap();

    let reply = send(
        &app,
        Method::POST,
        "/users",
        Some(&admin),
        Some(json!({
            "username": "mechanic",
            "password": "wrench-pass",
            "role": "STAFF",
            "branch_id": branch_id
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let staff = login(&app, "mechanic", "wrench-pass").await;

    let reply = send(
        &app,
        Method::POST,
        "/stock/in",
        Some(&staff),
        Some(json!({"lines": [{"product_id": product_id, "quantity": 5}]})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(&app, Method::GET, "/reports/sales", Some(&staff), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&staff),
        Some(json!({
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "NAB 4410", "name": "Lito Cruz"}
            },
            "lines": [{"product_id": product_id, "quantity": 4}]
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(stock_of(&app, &admin, product_id).await, 6);

    let job_id = reply.body["job_order"]["id"].as_str().unwrap();
    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/cancel", job_id),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_stock_out_is_all_or_nothing() {
    let app = app();
    let (admin, branch_id) = register(&app, "Atomic Garage", "atomic-admin").await;
    let plenty = create_product(&app, &admin, "Brake fluid", 20).await;
    let scarce = create_product(&app, &admin, "Brake pad", 1).await;

    let reply = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "QWE 555", "name": "Mara Lim"}
            },
            "lines": [
                {"product_id": plenty["id"], "quantity": 2},
                {"product_id": scarce["id"], "quantity": 4}
            ]
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    assert_eq!(stock_of(&app, &admin, plenty["id"].as_str().unwrap()).await, 20);
    assert_eq!(stock_of(&app, &admin, scarce["id"].as_str().unwrap()).await, 1);

    let jobs = send(&app, Method::GET, "/job-orders", Some(&admin), None).await;
    assert_eq!(jobs.body["total"], 0);
    let customers = send(&app, Method::GET, "/customers", Some(&admin), None).await;
    assert_eq!(customers.body["total"], 0);
}

#[tokio::test]
async fn test_stock_out_needs_exactly_one_target() {
    let app = app();
    let (admin, branch_id) = register(&app, "Target Garage", "target-admin").await;
    let product = create_product(&app, &admin, "Wiper", 5).await;

    let neither = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({"lines": [{"product_id": product["id"], "quantity": 1}]})),
    )
    .await;
    assert_eq!(neither.status, StatusCode::UNPROCESSABLE_ENTITY);

    let both = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({
            "job_order_id": "anything",
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "WIP 1", "name": "Dan"}
            },
            "lines": [{"product_id": product["id"], "quantity": 1}]
        })),
    )
    .await;
    assert_eq!(both.status, StatusCode::UNPROCESSABLE_ENTITY);

    let zero = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "WIP 1", "name": "Dan"}
            },
            "lines": [{"product_id": product["id"], "quantity": 0}]
        })),
    )
    .await;
    assert_eq!(zero.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_job_order_lifecycle() {
    let app = app();
    let (admin, _) = register(&app, "Cycle Garage", "cycle-admin").await;
    let oil = create_product(&app, &admin, "Engine oil", 10).await;
    let oil_id = oil["id"].as_str().unwrap();

    let reply = send(
        &app,
        Method::POST,
        "/job-orders",
        Some(&admin),
        Some(json!({
            "customer": {"plate_number": "oil-2020", "name": "Joy Tan"},
            "description": "Oil change"
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["job_number"], "JO-000001");
    let job_id = reply.body["id"].as_str().unwrap().to_string();

    // Same plate is the same customer.
    let reply = send(
        &app,
        Method::POST,
        "/customers",
        Some(&admin),
        Some(json!({"plate_number": "OIL 2020", "name": "Someone Else"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "Joy Tan");

    for quantity in [2, 1] {
        let reply = send(
            &app,
            Method::POST,
            &format!("/job-orders/{}/stock-out", job_id),
            Some(&admin),
            Some(json!({"lines": [{"product_id": oil_id, "quantity": quantity}]})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CREATED);
    }

    let detail = send(
        &app,
        Method::GET,
        &format!("/job-orders/{}", job_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(detail.status, StatusCode::OK);
    let items = detail.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(stock_of(&app, &admin, oil_id).await, 7);

    // Removing the line puts the stock back.
    let item_id = items[0]["id"].as_str().unwrap();
    let reply = send(
        &app,
        Method::DELETE,
        &format!("/job-orders/{}/items/{}", job_id, item_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["kind"], "ADJUST");
    assert_eq!(reply.body["quantity"], 3);
    assert_eq!(stock_of(&app, &admin, oil_id).await, 10);

    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/stock-out", job_id),
        Some(&admin),
        Some(json!({"lines": [{"product_id": oil_id, "quantity": 1}]})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);

    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/complete", job_id),
        Some(&admin),
        Some(json!({"payment_method": "CARD"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["bill_number"], "BILL-000001");

    // A completed job is frozen.
    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/stock-out", job_id),
        Some(&admin),
        Some(json!({"lines": [{"product_id": oil_id, "quantity": 1}]})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/complete", job_id),
        Some(&admin),
        Some(json!({"payment_method": "CARD"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let bills = send(&app, Method::GET, "/bills", Some(&admin), None).await;
    assert_eq!(bills.body["total"], 1);
}

#[tokio::test]
async fn test_cancel_returns_issued_stock() {
    let app = app();
    let (admin, branch_id) = register(&app, "Cancel Garage", "cancel-admin").await;
    let belt = create_product(&app, &admin, "Timing belt", 4).await;
    let belt_id = belt["id"].as_str().unwrap();

    let reply = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "BLT 77", "name": "Ben Ong"}
            },
            "lines": [{"product_id": belt_id, "quantity": 3}]
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(stock_of(&app, &admin, belt_id).await, 1);

    let job_id = reply.body["job_order"]["id"].as_str().unwrap();
    let reply = send(
        &app,
        Method::POST,
        &format!("/job-orders/{}/cancel", job_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "CANCELLED");
    assert_eq!(stock_of(&app, &admin, belt_id).await, 4);

    let low = send(&app, Method::GET, "/reports/low-stock", Some(&admin), None).await;
    assert_eq!(low.status, StatusCode::OK);
    assert_eq!(low.body["total"], 0);
}

#[tokio::test]
async fn test_tenants_do_not_see_each_other() {
    let app = app();
    let (first, _) = register(&app, "North Garage", "north-admin").await;
    let (second, _) = register(&app, "South Garage", "south-admin").await;
    let product = create_product(&app, &first, "Radiator cap", 2).await;

    let reply = send(
        &app,
        Method::GET,
        &format!("/products/{}", product["id"].as_str().unwrap()),
        Some(&second),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let listing = send(&app, Method::GET, "/products", Some(&second), None).await;
    assert_eq!(listing.body["total"], 0);

    // Numbering is per tenant.
    let theirs = create_product(&app, &second, "Radiator cap", 2).await;
    assert_eq!(theirs["sku"], "SKU-00001");
}

#[tokio::test]
async fn test_logout_invalidates_the_session() {
    let app = app();
    let (admin, _) = register(&app, "Exit Garage", "exit-admin").await;

    let me = send(&app, Method::GET, "/auth/me", Some(&admin), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "exit-admin");

    let out = send(&app, Method::POST, "/auth/logout", Some(&admin), None).await;
    assert_eq!(out.status, StatusCode::NO_CONTENT);

    let me = send(&app, Method::GET, "/auth/me", Some(&admin), None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_is_rejected_and_purged() {
    let state = app_state(MemoryStore::new(), ApiSettings::default());
    let app = create_router(state.clone());
    let (admin, _) = register(&app, "Clock Garage", "clock-admin").await;
    let me = send(&app, Method::GET, "/auth/me", Some(&admin), None).await;

    let now = Utc::now();
    state
        .store
        .insert_session(Session {
            token_hash: hash_token("yesterdays-token"),
            user_id: me.body["user_id"].as_str().unwrap().to_string(),
            tenant_id: me.body["tenant_id"].as_str().unwrap().to_string(),
            created_at: now - Duration::hours(13),
            expires_at: now - Duration::hours(1),
        })
        .await
        .unwrap();

    let reply = send(
        &app,
        Method::GET,
        "/auth/me",
        Some("garage_session=yesterdays-token"),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert!(state
        .store
        .get_session(&hash_token("yesterdays-token"))
        .await
        .unwrap()
        .is_none());

    // The live session is untouched.
    let me = send(&app, Method::GET, "/auth/me", Some(&admin), None).await;
    assert_eq!(me.status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_manages_users_but_not_their_own_rank() {
    let app = app();
    let (admin, branch_id) = register(&app, "People Garage", "people-admin").await;
    let me = send(&app, Method::GET, "/auth/me", Some(&admin), None).await;
    let admin_id = me.body["user_id"].as_str().unwrap().to_string();

    for body in [json!({"is_active": false}), json!({"role": "MANAGER"})] {
        let reply = send(
            &app,
            Method::PATCH,
            &format!("/users/{}", admin_id),
            Some(&admin),
            Some(body),
        )
        .await;
        assert_eq!(reply.status, StatusCode::CONFLICT);
    }

    let reply = send(
        &app,
        Method::POST,
        "/users",
        Some(&admin),
        Some(json!({
            "username": "floor-lead",
            "password": "lead-pass-1",
            "role": "MANAGER",
            "branch_id": branch_id
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let lead_id = reply.body["id"].as_str().unwrap().to_string();
    let lead = login(&app, "floor-lead", "lead-pass-1").await;

    // Managers cannot touch accounts.
    let reply = send(
        &app,
        Method::PATCH,
        &format!("/users/{}", lead_id),
        Some(&lead),
        Some(json!({"role": "ADMIN"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = send(
        &app,
        Method::PATCH,
        &format!("/users/{}", lead_id),
        Some(&admin),
        Some(json!({"role": "STAFF", "display_name": "Lead Tech"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["role"], "STAFF");
    assert_eq!(reply.body["display_name"], "Lead Tech");

    let reply = send(
        &app,
        Method::PATCH,
        &format!("/users/{}", lead_id),
        Some(&admin),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);

    // A deactivated user loses both the live session and the ability to sign in.
    let me = send(&app, Method::GET, "/auth/me", Some(&lead), None).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    let reply = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({"username": "floor-lead", "password": "lead-pass-1"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_job_order_details_edit_until_closed() {
    let app = app();
    let (admin, _) = register(&app, "Edit Garage", "edit-admin").await;
    let reply = send(
        &app,
        Method::POST,
        "/job-orders",
        Some(&admin),
        Some(json!({"customer": {"plate_number": "EDT 300", "name": "Nina Go"}})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let job_id = reply.body["id"].as_str().unwrap().to_string();
    let path = format!("/job-orders/{}", job_id);

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"description": "Aircon check", "labor_cost": "750.00"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["description"], "Aircon check");
    assert_eq!(reply.body["status"], "OPEN");

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"labor_cost": "750.005"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"labor_cost": "-1"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);

    let reply = send(
        &app,
        Method::POST,
        &format!("{}/complete", path),
        Some(&admin),
        Some(json!({"payment_method": "CASH"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    // Labor only: 750.00 + 12% VAT.
    let grand_total: Decimal = reply.body["grand_total"].as_str().unwrap().parse().unwrap();
    assert_eq!(grand_total, Decimal::new(840, 0));

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"description": "Too late"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let detail = send(&app, Method::GET, &path, Some(&admin), None).await;
    assert_eq!(detail.body["job_order"]["status"], "COMPLETED");
    assert_eq!(detail.body["job_order"]["description"], "Aircon check");
    assert_eq!(detail.body["bill"]["bill_number"], "BILL-000001");
}

#[tokio::test]
async fn test_product_edits_leave_stock_alone() {
    let app = app();
    let (admin, _) = register(&app, "Shelf Garage", "shelf-admin").await;
    let product = create_product(&app, &admin, "Coolant", 6).await;
    let path = format!("/products/{}", product["id"].as_str().unwrap());

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({
            "name": "Coolant 1L",
            "selling_price": "72.50",
            "stock_quantity": 999
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["name"], "Coolant 1L");
    assert_eq!(reply.body["selling_price"], "72.50");
    assert_eq!(reply.body["stock_quantity"], 6);

    for body in [
        json!({"selling_price": "0.125"}),
        json!({"cost_price": "-5.00"}),
        json!({"selling_price": "10000000000"}),
        json!({"name": "  "}),
    ] {
        let reply = send(&app, Method::PATCH, &path, Some(&admin), Some(body)).await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    let reply = send(&app, Method::DELETE, &path, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    let listing = send(&app, Method::GET, "/products", Some(&admin), None).await;
    assert_eq!(listing.body["total"], 0);
}

#[tokio::test]
async fn test_customer_edits_normalize_the_plate() {
    let app = app();
    let (admin, _) = register(&app, "Plate Garage", "plate-admin").await;
    let reply = send(
        &app,
        Method::POST,
        "/customers",
        Some(&admin),
        Some(json!({"plate_number": "old 111", "name": "Carlo Diaz"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let path = format!("/customers/{}", reply.body["id"].as_str().unwrap());

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"plate_number": "new-222", "phone": "0917 000 0000"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["plate_number"], "NEW222");
    assert_eq!(reply.body["name"], "Carlo Diaz");

    let reply = send(
        &app,
        Method::PATCH,
        &path,
        Some(&admin),
        Some(json!({"name": "   "})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);

    let found = send(&app, Method::GET, "/customers?q=new222", Some(&admin), None).await;
    assert_eq!(found.body["total"], 1);
}

#[tokio::test]
async fn test_adjustments_feed_transactions_and_movements() {
    let app = app();
    let (admin, branch_id) = register(&app, "Count Garage", "count-admin").await;
    let bulbs = create_product(&app, &admin, "Headlight bulb", 10).await;
    let bulbs_id = bulbs["id"].as_str().unwrap();
    let other = create_product(&app, &admin, "Fuse", 4).await;

    let reply = send(
        &app,
        Method::POST,
        "/stock/adjust",
        Some(&admin),
        Some(json!({"product_id": bulbs_id, "counted_quantity": 7, "note": "cycle count"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["kind"], "ADJUST");
    assert_eq!(reply.body["quantity"], -3);
    assert_eq!(reply.body["balance_after"], 7);

    for counted in [7, -1] {
        let reply = send(
            &app,
            Method::POST,
            "/stock/adjust",
            Some(&admin),
            Some(json!({"product_id": bulbs_id, "counted_quantity": counted})),
        )
        .await;
        assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    let reply = send(
        &app,
        Method::POST,
        "/stock/out",
        Some(&admin),
        Some(json!({
            "walk_in": {
                "branch_id": branch_id,
                "customer": {"plate_number": "BLB 9", "name": "Ivy Sy"}
            },
            "lines": [{"product_id": bulbs_id, "quantity": 2}]
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let job_id = reply.body["job_order"]["id"].as_str().unwrap().to_string();

    let adjustments = send(
        &app,
        Method::GET,
        "/stock/transactions?kind=ADJUST",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(adjustments.status, StatusCode::OK);
    assert_eq!(adjustments.body["total"], 1);

    let for_bulbs = send(
        &app,
        Method::GET,
        &format!("/stock/transactions?product_id={}", bulbs_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(for_bulbs.body["total"], 3);

    let for_job = send(
        &app,
        Method::GET,
        &format!("/stock/transactions?job_order_id={}", job_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(for_job.body["total"], 1);
    assert_eq!(for_job.body["items"][0]["kind"], "SALE");

    let movements = send(
        &app,
        Method::GET,
        "/reports/stock-movements",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(movements.status, StatusCode::OK);
    let rows = movements.body["items"].as_array().unwrap();
    let bulb_row = rows
        .iter()
        .find(|r| r["product_id"] == bulbs["id"])
        .unwrap();
    assert_eq!(bulb_row["purchased"], 10);
    assert_eq!(bulb_row["sold"], 2);
    assert_eq!(bulb_row["adjusted"], -3);
    assert_eq!(bulb_row["net"], 5);
    let fuse_row = rows
        .iter()
        .find(|r| r["product_id"] == other["id"])
        .unwrap();
    assert_eq!(fuse_row["net"], 4);
}
