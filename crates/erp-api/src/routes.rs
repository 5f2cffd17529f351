//! API routes

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::extractors::AppState;
use crate::handlers::{
    activity, admin, auth, budgets, chat, contacts, dashboard, departments, employees, files,
    notifications, projects, resources, tasks,
};
use crate::middleware::{invalidate_caches, record_activity};
use crate::ws::ws_handler;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the complete API router: `/api/*` plus the `/ws` push channel
pub fn router(state: AppState) -> Router {
    let upload_limit = state.files.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    let api = Router::new()
        .route("/", get(api_root))
        .nest("/auth", auth_router())
        .route("/permissions", get(admin::permission_catalog))
        .nest("/roles", roles_router())
        .nest("/users", users_router())
        .nest("/departments", departments_router())
        .nest("/employees", employees_router())
        .nest("/projects", projects_router())
        .nest("/tasks", tasks_router())
        .nest("/budgets", budgets_router())
        .nest("/resources", resources_router())
        .nest("/contacts", contacts_router())
        .nest("/chats", chats_router())
        .nest("/notifications", notifications_router())
        .nest("/activity", activity_router())
        .nest("/files", files_router(upload_limit))
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
        .route("/admin/backup", get(admin::download_backup));

    // Outside the nest so the middleware sees the full `/api/...` path
    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), invalidate_caches))
        .layer(middleware::from_fn_with_state(state.clone(), record_activity))
        .with_state(state)
}

fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/password", put(auth::change_password))
}

fn roles_router() -> Router<AppState> {
    Router::new()
        .route("/", get(admin::list_roles).post(admin::create_role))
        .route(
            "/:id",
            get(admin::get_role)
                .put(admin::update_role)
                .delete(admin::delete_role),
        )
}

fn users_router() -> Router<AppState> {
    Router::new().route("/", get(admin::list_users)).route(
        "/:id",
        get(admin::get_user)
            .put(admin::update_user)
            .delete(admin::delete_user),
    )
}

fn departments_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(departments::list_departments).post(departments::create_department),
        )
        .route(
            "/:id",
            get(departments::get_department)
                .put(departments::update_department)
                .delete(departments::delete_department),
        )
        .route(
            "/:id/permissions",
            put(departments::update_department_permissions),
        )
}

fn employees_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route("/skills", get(employees::list_skills))
        .route(
            "/:id",
            get(employees::get_employee)
                .put(employees::update_employee)
                .delete(employees::delete_employee),
        )
        .route("/:id/link-user", post(employees::link_user))
}

fn projects_router() -> Router<AppState> {
    Router::new()
        .route("/", get(projects::list_projects).post(projects::create_project))
        .route(
            "/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/stats", get(projects::project_stats))
        .route("/:id/team", post(projects::add_team_member))
        .route("/:id/team/:employee_id", delete(projects::remove_team_member))
}

fn tasks_router() -> Router<AppState> {
    Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route("/time-tracking", get(tasks::time_tracking))
        .route("/dependency-graph", get(tasks::dependency_graph))
        .route("/critical-path", get(tasks::critical_path))
        .route(
            "/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/:id/status", patch(tasks::update_task_status))
        .route("/:id/comments", post(tasks::add_comment))
        .route("/:id/time", post(tasks::log_time))
        .route("/:id/dependencies", post(tasks::add_dependency))
        .route(
            "/:id/dependencies/:dependency_id",
            delete(tasks::remove_dependency),
        )
        .route("/:id/blocked", get(tasks::blocked_status))
}

fn budgets_router() -> Router<AppState> {
    Router::new()
        .route("/", get(budgets::list_budgets).post(budgets::create_budget))
        .route("/summary", get(budgets::budget_summary))
        .route(
            "/:id",
            get(budgets::get_budget)
                .put(budgets::update_budget)
                .delete(budgets::delete_budget),
        )
        .route("/:id/submit", post(budgets::submit_budget))
        .route("/:id/approve", post(budgets::approve_budget))
        .route("/:id/reject", post(budgets::reject_budget))
        .route("/:id/activate", post(budgets::activate_budget))
        .route("/:id/close", post(budgets::close_budget))
        .route("/:id/expenses", post(budgets::record_expense))
        .route("/:id/variance", get(budgets::budget_variance))
        .route("/:id/alerts", get(budgets::budget_alerts))
}

fn resources_router() -> Router<AppState> {
    Router::new()
        .route(
            "/allocations",
            get(resources::list_allocations).post(resources::create_allocation),
        )
        .route(
            "/allocations/:id",
            get(resources::get_allocation)
                .put(resources::update_allocation)
                .delete(resources::delete_allocation),
        )
        .route("/utilization/:employee_id", get(resources::employee_utilization))
        .route("/conflicts", get(resources::detect_conflicts))
        .route("/capacity", get(resources::capacity_planning))
        .route("/skills", get(resources::skill_matrix))
}

fn contacts_router() -> Router<AppState> {
    Router::new()
        .route("/", get(contacts::list_contacts).post(contacts::create_contact))
        .route("/search", get(contacts::search_contacts))
        .route(
            "/:id",
            get(contacts::get_contact)
                .put(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
}

fn chats_router() -> Router<AppState> {
    Router::new()
        .route("/", get(chat::list_chats))
        .route("/unread", get(chat::unread_counts))
        .route("/direct", post(chat::open_direct))
        .route("/group", post(chat::create_group))
        .route("/:id", get(chat::get_chat))
        .route("/:id/messages", post(chat::send_message))
        .route("/:id/messages/:message_id", delete(chat::delete_message))
        .route("/:id/read", post(chat::mark_read))
}

fn notifications_router() -> Router<AppState> {
    Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/unread-count", get(notifications::unread_count))
        .route("/read-all", post(notifications::mark_all_read))
        .route("/announce", post(notifications::announce))
        .route("/:id", delete(notifications::delete_notification))
        .route("/:id/read", post(notifications::mark_read))
}

fn activity_router() -> Router<AppState> {
    Router::new()
        .route("/", get(activity::list_activity))
        .route("/stats", get(activity::activity_stats))
        .route("/recent", get(activity::recent_activity))
}

fn files_router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(files::list_files)
                .post(files::upload_file)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/:id", get(files::download_file).delete(files::delete_file))
}

async fn api_root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "ERP RS",
            "version": env!("CARGO_PKG_VERSION"),
            "realtime": "/ws",
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use erp_core::config::AppConfig;
    use erp_db::{seed_default_roles, Stores};
    use erp_files::MemoryStorage;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    async fn test_app() -> Router {
        let stores = Stores::memory();
        seed_default_roles(stores.roles.as_ref()).await.unwrap();
        let state = AppState::new(&stores, Arc::new(MemoryStorage::new()), &AppConfig::default());
        router(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn register(app: &Router, email: &str) -> String {
        let (status, body) = send(
            app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Ada", "email": email, "password": "password1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let app = test_app().await;
        register(&app, "ada@example.com").await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "email": "ADA@example.com", "password": "password1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["data"]["role"]["name"], "Root");
        let token = body["data"]["token"].as_str().unwrap();

        let (status, body) = send(&app, get_request("/api/auth/me", Some(token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], "ada@example.com");
        assert!(body["data"]["user"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_bad_credentials_are_rejected() {
        let app = test_app().await;
        register(&app, "ada@example.com").await;

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/login",
                None,
                json!({ "email": "ada@example.com", "password": "wrong-password" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "unauthorized");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = test_app().await;

        let (status, body) = send(&app, get_request("/api/projects", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, get_request("/api/projects", Some("not-a-jwt"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_error_envelopes() {
        let app = test_app().await;
        let token = register(&app, "ada@example.com").await;

        let (status, body) = send(&app, get_request("/api/projects/999", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Ada", "email": "ada@example.com", "password": "password1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/auth/register",
                None,
                json!({ "name": "Bob", "email": "not-an-email", "password": "password1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["errors"]["email"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = test_app().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_mutations_are_recorded() {
        let app = test_app().await;
        let token = register(&app, "ada@example.com").await;

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/departments",
                Some(&token),
                json!({ "name": "Engineering", "description": "Builds things", "location": "Berlin" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, get_request("/api/activity?resource=departments", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["data"]["items"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["method"], "POST");
        assert_eq!(items[0]["path"], "/api/departments");
        assert_eq!(items[0]["userName"], "Ada");
        assert_eq!(items[0]["success"], true);

        // reads are not recorded
        let (_, body) = send(&app, get_request("/api/activity/recent", Some(&token))).await;
        let recent = body["data"].as_array().unwrap();
        assert!(recent.iter().all(|entry| entry["method"] != "GET"));
    }

    #[tokio::test]
    async fn test_permission_catalog() {
        let app = test_app().await;
        let token = register(&app, "ada@example.com").await;

        let (status, body) = send(&app, get_request("/api/permissions", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(names.contains(&"projects.view"));
    }

    #[tokio::test]
    async fn test_backup_is_a_zip_download() {
        let app = test_app().await;
        let token = register(&app, "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(get_request("/api/admin/backup", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/zip"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[tokio::test]
    async fn test_backup_requires_admin() {
        let app = test_app().await;
        register(&app, "root@example.com").await;
        let token = register(&app, "staff@example.com").await;

        let (status, body) = send(&app, get_request("/api/admin/backup", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");
    }

    #[tokio::test]
    async fn test_task_dependency_routes() {
        let app = test_app().await;
        let token = register(&app, "ada@example.com").await;
        let (_, body) = send(
            &app,
            json_request("POST", "/api/projects", Some(&token), json!({ "name": "Launch" })),
        )
        .await;
        let project_id = body["data"]["id"].as_i64().unwrap();

        let mut ids = Vec::new();
        for (title, hours) in [("Design", 3.0), ("Build", 5.0)] {
            let (status, body) = send(
                &app,
                json_request(
                    "POST",
                    "/api/tasks",
                    Some(&token),
                    json!({ "projectId": project_id, "title": title, "estimatedHours": hours }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            ids.push(body["data"]["id"].as_i64().unwrap());
        }
        let (design, build) = (ids[0], ids[1]);

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/tasks/{build}/dependencies"),
                Some(&token),
                json!({ "dependsOn": design }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dependencies"][0]["type"], "finish-to-start");

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/tasks/{design}/dependencies"),
                Some(&token),
                json!({ "dependsOn": build }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Circular dependency detected");

        let uri = format!("/api/tasks/critical-path?projectId={project_id}");
        let (status, body) = send(&app, get_request(&uri, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalDuration"], 8.0);

        let (_, body) = send(&app, get_request(&format!("/api/tasks/{build}/blocked"), Some(&token))).await;
        assert_eq!(body["data"]["isBlocked"], true);
        assert_eq!(body["data"]["blockedBy"][0]["title"], "Design");

        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/api/tasks/{build}/dependencies/{design}"))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["dependencies"], json!([]));
    }

    #[tokio::test]
    async fn test_ws_rejects_invalid_token() {
        let app = test_app().await;
        let request = Request::builder()
            .uri("/ws?token=bogus")
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        let (status, body) = send(&app, get_request("/ws", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_api_root() {
        let app = test_app().await;
        let (status, body) = send(&app, get_request("/api", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["realtime"], "/ws");
    }
}
