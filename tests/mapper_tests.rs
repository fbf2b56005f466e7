mod common;

use brrtmapper::{
    stage, Context, Mapper, MapperError, MapperOptions, Next, ParamSpec, Request, RouteOptions,
};
use common::{echo_params, get, log, quiet_mapper, respond, send, trace};
use http::{Method, StatusCode};
use serde_json::{json, Value};

fn users_mapper() -> Mapper {
    let mapper = quiet_mapper();
    mapper
        .get(
            "/users/:id",
            RouteOptions::new()
                .name("user")
                .param("id", ParamSpec::new("number").required()),
            echo_params(),
        )
        .unwrap();
    mapper
}

#[test]
fn test_numeric_path_param_is_coerced() {
    let ctx = get(&users_mapper(), "/users/42");
    assert_eq!(ctx.response.status(), StatusCode::OK);
    assert_eq!(ctx.response.body, Some(json!({"id": 42})));
    assert_eq!(ctx.matched_route.as_deref(), Some("/users/:id"));
    assert_eq!(ctx.matched_route_name.as_deref(), Some("user"));
    assert_eq!(ctx.route_name.as_deref(), Some("user"));
}

#[test]
fn test_invalid_path_param_is_a_client_error() {
    let ctx = get(&users_mapper(), "/users/abc");
    assert_eq!(ctx.response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.response.body, Some(json!("[id] should be number")));
}

#[test]
fn test_unmatched_path_falls_through() {
    let ctx = get(&users_mapper(), "/teams/1");
    assert_eq!(ctx.response.status(), StatusCode::NOT_FOUND);
    assert!(ctx.matched.is_empty());
}

#[test]
fn test_mounted_mapper_dispatches_once() {
    let child = quiet_mapper();
    child
        .get(
            "/child",
            RouteOptions::new(),
            vec![stage(|ctx: &mut Context, _next: Next<'_>| {
                log(ctx, "child");
                ctx.set_body(json!("child"));
                Ok(())
            })],
        )
        .unwrap();
    let parent = quiet_mapper();
    parent.mount(Some("/parent"), &child).unwrap();

    let ctx = get(&parent, "/parent/child");
    assert_eq!(ctx.response.body, Some(json!("child")));
    assert_eq!(ctx.state["log"], json!(["child"]));
    assert_eq!(get(&parent, "/child").response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_mount_applies_parent_prefix() {
    let child = quiet_mapper();
    child.get("/items", RouteOptions::new(), respond(json!("items"))).unwrap();
    let parent = Mapper::with_options(MapperOptions {
        prefix: "/api".to_string(),
        ..MapperOptions::without_openapi()
    })
    .unwrap();
    parent.mount(Some("/shop"), &child).unwrap();
    assert_eq!(get(&parent, "/api/shop/items").response.body, Some(json!("items")));
}

#[test]
fn test_parent_param_handlers_reach_nested_routes() {
    let child = quiet_mapper();
    child.get("/:id", RouteOptions::new(), respond(json!("ok"))).unwrap();
    let parent = quiet_mapper();
    parent.param("id", |value: Value, ctx: &mut Context, next: Next<'_>| {
        log(ctx, &format!("id={}", value.as_str().unwrap_or_default()));
        next.run(ctx)
    });
    parent.mount(Some("/things"), &child).unwrap();

    let ctx = get(&parent, "/things/7");
    assert_eq!(ctx.state["log"], json!(["id=7"]));
    assert_eq!(ctx.response.body, Some(json!("ok")));
}

#[test]
fn test_use_without_path_runs_before_matched_routes() {
    let mapper = quiet_mapper();
    mapper.use_middleware(None, vec![trace("mw")]).unwrap();
    mapper
        .get("/a", RouteOptions::new(), vec![trace("a"), respond(json!("a")).remove(0)])
        .unwrap();

    let ctx = get(&mapper, "/a");
    assert_eq!(ctx.state["log"], json!(["mw", "a"]));
    assert_eq!(ctx.response.body, Some(json!("a")));

    let ctx = get(&mapper, "/nothing");
    assert_eq!(ctx.response.status(), StatusCode::NOT_FOUND);
    assert!(ctx.state.get("log").is_none());
}

#[test]
fn test_use_with_path_is_scoped() {
    let mapper = quiet_mapper();
    mapper
        .use_middleware(Some("/admin".into()), vec![trace("admin")])
        .unwrap();
    mapper.get("/admin/users", RouteOptions::new(), respond(json!("users"))).unwrap();
    mapper.get("/public", RouteOptions::new(), respond(json!("public"))).unwrap();

    assert_eq!(get(&mapper, "/admin/users").state["log"], json!(["admin"]));
    assert!(get(&mapper, "/public").state.get("log").is_none());
}

#[test]
fn test_routes_sharing_a_path_run_in_order() {
    let mapper = quiet_mapper();
    mapper.get("/x", RouteOptions::new(), vec![trace("first")]).unwrap();
    mapper.get("/x", RouteOptions::new(), vec![trace("second")]).unwrap();
    mapper.get("/x", RouteOptions::new(), respond(json!("done"))).unwrap();

    let ctx = get(&mapper, "/x");
    assert_eq!(ctx.state["log"], json!(["first", "second"]));
    assert_eq!(ctx.response.body, Some(json!("done")));
}

#[test]
fn test_multiple_paths_fan_out() {
    let mapper = quiet_mapper();
    mapper
        .get(["/a", "/b"], RouteOptions::new(), respond(json!("shared")))
        .unwrap();
    assert_eq!(mapper.stack().len(), 2);
    assert_eq!(get(&mapper, "/a").response.body, Some(json!("shared")));
    assert_eq!(get(&mapper, "/b").response.body, Some(json!("shared")));
}

#[test]
fn test_named_route_fans_out_over_paths() {
    let mapper = quiet_mapper();
    mapper
        .get(["/a", "/b"], RouteOptions::new().name("x"), respond(json!("shared")))
        .unwrap();
    assert_eq!(mapper.stack().len(), 2);
    assert_eq!(get(&mapper, "/b").response.body, Some(json!("shared")));

    let first = mapper.route("x").unwrap();
    assert_eq!(first.read().unwrap().path(), "/a");
    assert_eq!(mapper.url("x", &json!({}), &Value::Null).unwrap(), "/a");

    assert_eq!(
        mapper
            .get(["/c", "/d"], RouteOptions::new().name("x"), respond(json!("late")))
            .unwrap_err(),
        MapperError::DuplicateRouteName("x".to_string())
    );
    assert_eq!(mapper.stack().len(), 2);
    assert_eq!(get(&mapper, "/c").response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_url_round_trip() {
    let mapper = users_mapper();
    let url = mapper
        .url("user", &json!({"id": 3}), &json!({"fields": ["name", "email"]}))
        .unwrap();
    assert_eq!(url, "/users/3?fields[]=name&fields[]=email");

    let ctx = get(&mapper, &url);
    assert_eq!(ctx.response.body, Some(json!({"id": 3})));
}

#[test]
fn test_url_errors() {
    let mapper = users_mapper();
    assert_eq!(
        mapper.url("missing", &json!({}), &Value::Null).unwrap_err(),
        MapperError::RouteNotFound("missing".to_string())
    );
    assert_eq!(
        mapper.url("user", &json!({}), &Value::Null).unwrap_err(),
        MapperError::MissingUrlParam("id".to_string())
    );
}

#[test]
fn test_redirect_with_explicit_status() {
    let mapper = quiet_mapper();
    mapper
        .redirect("/login", "/sign-in", Some(StatusCode::FOUND))
        .unwrap();
    let ctx = send(&mapper, Request::new(Method::POST, "/login"));
    assert_eq!(ctx.response.status(), StatusCode::FOUND);
    assert_eq!(ctx.response.header("location"), Some("/sign-in"));
}

#[test]
fn test_mapper_path_overrides_request_path() {
    let mapper = users_mapper();
    let mut ctx = Context::new(Request::new(Method::GET, "/rewritten"));
    ctx.mapper_path = Some("/users/9".to_string());
    let result = mapper.handle(&mut ctx);
    ctx.finish(result);
    assert_eq!(ctx.response.body, Some(json!({"id": 9})));
}

#[test]
fn test_case_insensitive_by_default_and_sensitive_on_request() {
    let mapper = quiet_mapper();
    mapper.get("/Docs", RouteOptions::new(), respond(json!("docs"))).unwrap();
    mapper
        .get("/Exact", RouteOptions::new().sensitive(true), respond(json!("exact")))
        .unwrap();
    assert_eq!(get(&mapper, "/docs").response.status(), StatusCode::OK);
    assert_eq!(get(&mapper, "/exact").response.status(), StatusCode::NOT_FOUND);
    assert_eq!(get(&mapper, "/Exact").response.status(), StatusCode::OK);
}

#[test]
fn test_handler_errors_become_responses() {
    let mapper = quiet_mapper();
    mapper
        .get(
            "/boom",
            RouteOptions::new(),
            vec![stage(|_ctx: &mut Context, _next: Next<'_>| {
                Err(brrtmapper::HttpError::new(StatusCode::CONFLICT, "already exists"))
            })],
        )
        .unwrap();
    let ctx = get(&mapper, "/boom");
    assert_eq!(ctx.response.status(), StatusCode::CONFLICT);
    assert_eq!(ctx.response.body, Some(json!("already exists")));
}

#[test]
fn test_missing_middleware_is_a_configuration_error() {
    let mapper = quiet_mapper();
    let err = mapper
        .post("/items", RouteOptions::new().name("create"), Vec::new())
        .unwrap_err();
    assert_eq!(err.to_string(), "POST create: middleware must be a function");
}

#[test]
fn test_duplicate_names_across_mounts() {
    let child = quiet_mapper();
    child.get("/a", RouteOptions::new().name("dup"), respond(json!(1))).unwrap();
    let parent = quiet_mapper();
    parent.get("/b", RouteOptions::new().name("dup"), respond(json!(2))).unwrap();
    assert_eq!(
        parent.mount(None, &child).unwrap_err(),
        MapperError::DuplicateRouteName("dup".to_string())
    );
}

#[test]
fn test_full_chain_with_tracing_and_composition() {
    use brrtmapper::{compose, run_chain, AllowedMethodsOptions, TracingMiddleware};
    use std::sync::Arc;

    let mapper = users_mapper();
    let app = compose(vec![
        mapper.allowed_methods(AllowedMethodsOptions::default()),
        mapper.routes(),
    ]);
    let chain = vec![Arc::new(TracingMiddleware) as brrtmapper::Stage, trace("outer"), app];

    let mut ctx = Context::new(Request::new(Method::GET, "/users/5"));
    let result = run_chain(&chain, &mut ctx);
    ctx.finish(result);
    assert_eq!(ctx.state["log"], json!(["outer"]));
    assert_eq!(ctx.response.body, Some(json!({"id": 5})));

    let mut ctx = Context::new(Request::new(Method::POST, "/users/5"));
    let result = run_chain(&chain, &mut ctx);
    ctx.finish(result);
    assert_eq!(ctx.response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
