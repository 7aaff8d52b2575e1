//! Server tests — front-controller dispatch, caching policy, transfers.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use trellis_app::transfer::{BytesDownloadProvider, UploadEvent, UploadListener};
    use trellis_app::{Command, ComponentKind};
    use trellis_container::{AppContext, ApplicationDelegate};
    use trellis_protocol::SyncError;
    use trellis_server::{
        router, Connection, DiskSpoolStrategy, MultipartStrategy, ServerContext, Service,
        ServiceResponse, SessionHandle, SESSION_COOKIE,
    };

    // ─────────────────────────────────────────────────────────────────────
    // Harness
    // ─────────────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct UploadLog {
        files: Mutex<Vec<Vec<u8>>>,
        invalid: AtomicUsize,
    }

    impl UploadListener for UploadLog {
        fn file_upload(&self, event: UploadEvent) {
            let bytes = event.read_to_vec().unwrap();
            self.files.lock().unwrap().push(bytes);
        }
        fn invalid_file_upload(&self, _event: UploadEvent) {
            self.invalid.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Root pane (`c_0`) with a text field (`c_1`) and an upload select
    /// (`c_2`); element ids follow first-render order.
    struct TestApp {
        uploads: Arc<UploadLog>,
    }

    impl ApplicationDelegate for TestApp {
        fn init(&mut self, ctx: &mut AppContext<'_>) -> Result<(), SyncError> {
            let root = ctx.tree.init_root(ComponentKind::ContentPane)?;
            ctx.tree.add_child(root, ComponentKind::TextField)?;
            let select = ctx.tree.add_child(root, ComponentKind::UploadSelect)?;
            ctx.tree.set_upload_listener(select, self.uploads.clone())?;
            Ok(())
        }
    }

    struct Harness {
        ctx: Arc<ServerContext>,
        app: Router,
        uploads: Arc<UploadLog>,
    }

    impl Harness {
        fn new() -> Self {
            let uploads = Arc::new(UploadLog::default());
            let factory = {
                let uploads = uploads.clone();
                Arc::new(move || {
                    Box::new(TestApp {
                        uploads: uploads.clone(),
                    }) as Box<dyn ApplicationDelegate>
                })
            };
            let ctx = ServerContext::new(factory);
            let app = router(ctx.clone());
            Self { ctx, app, uploads }
        }

        /// First contact: starts a session, returns its cookie value.
        async fn start_session(&self) -> String {
            let response = self
                .app
                .clone()
                .oneshot(Request::get("/app").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let set_cookie = response
                .headers()
                .get(header::SET_COOKIE)
                .expect("new instance must set the session cookie")
                .to_str()
                .unwrap();
            assert!(set_cookie.starts_with(SESSION_COOKIE));
            set_cookie
                .split(';')
                .next()
                .unwrap()
                .to_string()
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let headers = response.headers().clone();
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap()
                .to_vec();
            (status, headers, body)
        }
    }

    fn sync_request(cookie: &str, body: Value) -> Request<Body> {
        Request::post("/app?serviceId=Trellis.Sync")
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dispatch table
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_contact_renders_the_initial_tree_and_binds_a_session() {
        let h = Harness::new();
        let response = h
            .app
            .clone()
            .oneshot(Request::get("/app").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let wire: Value = serde_json::from_slice(&body).unwrap();
        let update_group = wire["groups"]
            .as_array()
            .unwrap()
            .iter()
            .find(|g| g["id"] == "update")
            .unwrap();
        let adds: Vec<&Value> = update_group["directives"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|d| d["operation"] == "dom-add")
            .flat_map(|d| d["items"].as_array().unwrap())
            .collect();
        assert_eq!(adds.len(), 3); // pane, field, upload select
        assert_eq!(h.ctx.sessions.len(), 1);
    }

    #[tokio::test]
    async fn service_request_without_a_session_is_expired() {
        let h = Harness::new();
        let (status, headers, body) = h
            .send(
                Request::post("/app?serviceId=Trellis.Sync")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Session Expired");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn idless_request_with_a_session_rerenders_the_full_state() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, body) = h
            .send(
                Request::get("/app")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let wire: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(wire["groups"][1]["id"], "update");
        assert!(!wire["groups"][1]["directives"].as_array().unwrap().is_empty());
        assert_eq!(h.ctx.sessions.len(), 1);
    }

    #[tokio::test]
    async fn unknown_service_id_is_not_found() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, _body) = h
            .send(
                Request::get("/app?serviceId=Trellis.Nonsense")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Synchronize
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn client_edit_lands_in_the_server_tree() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, _body) = h
            .send(sync_request(
                &cookie,
                json!({
                    "propertyUpdates": [
                        {"componentId": "c_1", "property": "text", "value": "typed"}
                    ]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);

        let key = cookie.split('=').nth(1).unwrap();
        let session = h.ctx.sessions.get(key).unwrap();
        let instance = session.lock().await;
        let field = instance.tree().component_by_element_id("c_1").unwrap();
        assert_eq!(instance.tree().property(field, "text"), Some(&json!("typed")));
    }

    #[tokio::test]
    async fn stale_and_invalid_updates_are_skipped_not_fatal() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, _body) = h
            .send(sync_request(
                &cookie,
                json!({
                    "propertyUpdates": [
                        {"componentId": "c_999", "property": "text", "value": "ghost"},
                        {"componentId": "c_1", "property": "horizontal-scroll", "value": "nonsense"},
                        {"componentId": "c_1", "property": "text", "value": "kept"}
                    ]
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.ctx.sessions.len(), 1); // not disposed

        let key = cookie.split('=').nth(1).unwrap();
        let session = h.ctx.sessions.get(key).unwrap();
        let instance = session.lock().await;
        let field = instance.tree().component_by_element_id("c_1").unwrap();
        assert_eq!(instance.tree().property(field, "text"), Some(&json!("kept")));
    }

    #[tokio::test]
    async fn malformed_changeset_is_a_bad_request() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, _body) = h
            .send(
                Request::post("/app?serviceId=Trellis.Sync")
                    .header(header::COOKIE, &cookie)
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Caching policy
    // ─────────────────────────────────────────────────────────────────────

    struct StaticScriptService;

    impl Service for StaticScriptService {
        fn id(&self) -> &'static str {
            "Test.Script"
        }
        fn cacheable(&self) -> bool {
            true
        }
        async fn handle(
            &self,
            _ctx: Arc<ServerContext>,
            _session: Option<SessionHandle>,
            _conn: Connection,
        ) -> Result<ServiceResponse, SyncError> {
            Ok(ServiceResponse::ok("text/javascript", b"// lib".to_vec()))
        }
    }

    #[tokio::test]
    async fn cacheable_services_get_long_lived_headers() {
        let h = Harness::new();
        h.ctx.services.register(StaticScriptService);
        let cookie = h.start_session().await;
        let (status, headers, _body) = h
            .send(
                Request::get("/app?serviceId=Test.Script")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("cache-control").unwrap(), "max-age=3600");
        assert!(headers.contains_key("last-modified"));
        assert!(headers.contains_key("expires"));
        assert!(!headers.contains_key("pragma"));
    }

    #[tokio::test]
    async fn dynamic_services_are_uncacheable() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (_status, headers, _body) = h
            .send(
                Request::get("/app")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(headers.get("pragma").unwrap(), "no-cache");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert_eq!(headers.get("expires").unwrap(), "0");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Downloads
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn download_transfer_is_single_use() {
        let h = Harness::new();
        let cookie = h.start_session().await;

        // Application enqueues a download; the next cycle renders it and
        // registers the transfer.
        let key = cookie.split('=').nth(1).unwrap().to_string();
        {
            let session = h.ctx.sessions.get(&key).unwrap();
            session.lock().await.enqueue_command(Command::Download {
                provider: Arc::new(
                    BytesDownloadProvider::new("application/pdf", b"%PDF".to_vec())
                        .with_file_name("report.pdf"),
                ),
            });
        }
        let (status, _headers, body) = h.send(sync_request(&cookie, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let wire: Value = serde_json::from_slice(&body).unwrap();
        let uri = wire["groups"][1]["directives"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["processor"] == "Trellis.Download")
            .unwrap()["items"][0]["uri"]
            .as_str()
            .unwrap()
            .to_string();

        let fetch = |uri: String| {
            Request::get(format!("/app{uri}"))
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap()
        };
        let (status, headers, body) = h.send(fetch(uri.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"%PDF");
        assert_eq!(
            headers.get("content-disposition").unwrap(),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(headers.get("content-type").unwrap(), "application/pdf");

        // Spent: the same transfer id is no longer valid.
        let (status, _headers, body) = h.send(fetch(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Download UID is not valid.");
    }

    #[tokio::test]
    async fn download_without_a_transfer_id_is_rejected() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, body) = h
            .send(
                Request::get("/app?serviceId=Trellis.Download")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Download UID not specified.");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Uploads
    // ─────────────────────────────────────────────────────────────────────

    const BOUNDARY: &str = "trellis-test-boundary";

    fn multipart_request(cookie: &str, eid: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\ncontent-disposition: form-data; name=\"file\"; \
                 filename=\"notes.txt\"\r\ncontent-type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::post(format!("/app?serviceId=Trellis.Upload&eid={eid}"))
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_post_spools_then_action_delivers_to_the_listener() {
        let h = Harness::new();
        let cookie = h.start_session().await;

        let (status, headers, _body) =
            h.send(multipart_request(&cookie, "c_2", b"file contents")).await;
        assert_eq!(status, StatusCode::FOUND);
        let location = headers.get(header::LOCATION).unwrap().to_str().unwrap();
        assert!(location.contains("Trellis.UploadForm"));
        assert!(h.uploads.files.lock().unwrap().is_empty()); // not yet delivered

        let (status, _headers, _body) = h
            .send(sync_request(
                &cookie,
                json!({"action": {"componentId": "c_2", "name": "upload"}}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *h.uploads.files.lock().unwrap(),
            vec![b"file contents".to_vec()]
        );
    }

    #[tokio::test]
    async fn empty_upload_reaches_the_invalid_callback() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        h.send(multipart_request(&cookie, "c_2", b"")).await;
        h.send(sync_request(
            &cookie,
            json!({"action": {"componentId": "c_2", "name": "upload"}}),
        ))
        .await;
        assert_eq!(h.uploads.invalid.load(Ordering::SeqCst), 1);
        assert!(h.uploads.files.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_uploads_do_not_cross_sessions() {
        // Element ids restart at c_0 in every session, so two sessions'
        // upload selects share the id c_2. Each action must deliver only the
        // payload its own session posted.
        let h = Harness::new();
        let first = h.start_session().await;
        let second = h.start_session().await;

        let (status, _headers, _body) =
            h.send(multipart_request(&first, "c_2", b"first session file")).await;
        assert_eq!(status, StatusCode::FOUND);
        let (status, _headers, _body) =
            h.send(multipart_request(&second, "c_2", b"second session file")).await;
        assert_eq!(status, StatusCode::FOUND);

        h.send(sync_request(
            &first,
            json!({"action": {"componentId": "c_2", "name": "upload"}}),
        ))
        .await;
        assert_eq!(
            *h.uploads.files.lock().unwrap(),
            vec![b"first session file".to_vec()]
        );

        h.send(sync_request(
            &second,
            json!({"action": {"componentId": "c_2", "name": "upload"}}),
        ))
        .await;
        assert_eq!(
            *h.uploads.files.lock().unwrap(),
            vec![b"first session file".to_vec(), b"second session file".to_vec()]
        );
    }

    #[tokio::test]
    async fn upload_to_an_unresolvable_element_is_rejected() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, body) =
            h.send(multipart_request(&cookie, "c_999", b"orphan")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, b"Upload target is not valid.");
    }

    #[tokio::test]
    async fn upload_form_page_targets_the_receiver() {
        let h = Harness::new();
        let cookie = h.start_session().await;
        let (status, _headers, body) = h
            .send(
                Request::get("/app?serviceId=Trellis.UploadForm&eid=c_2")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("serviceId=Trellis.Upload&amp;eid=c_2"));
        assert!(page.contains("multipart/form-data"));
        // No send button configured, so the form auto-submits.
        assert!(page.contains("this.form.submit()"));
    }

    #[tokio::test]
    async fn send_button_text_is_escaped_in_the_form_markup() {
        let h = Harness::new();
        let cookie = h.start_session().await;

        let key = cookie.split('=').nth(1).unwrap().to_string();
        {
            let session = h.ctx.sessions.get(&key).unwrap();
            let mut instance = session.lock().await;
            let select = instance.tree().component_by_element_id("c_2").unwrap();
            instance
                .tree_mut()
                .set_property(select, "send-button-text", json!("Send \"now\" <fast>"))
                .unwrap();
        }

        let (status, _headers, body) = h
            .send(
                Request::get("/app?serviceId=Trellis.UploadForm&eid=c_2")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("value=\"Send &quot;now&quot; &lt;fast&gt;\""));
        assert!(!page.contains("value=\"Send \"now\""));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Multipart strategy configuration
    // ─────────────────────────────────────────────────────────────────────

    struct RenamedStrategy(DiskSpoolStrategy);

    impl MultipartStrategy for RenamedStrategy {
        fn name(&self) -> &'static str {
            "renamed"
        }
        fn parse<'a>(
            &'a self,
            multipart: axum::extract::Multipart,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<
                        Output = Result<trellis_container::PendingUpload, SyncError>,
                    > + Send
                    + 'a,
            >,
        > {
            self.0.parse(multipart)
        }
    }

    #[tokio::test]
    async fn multipart_strategy_is_set_once() {
        let h = Harness::new();
        h.ctx
            .multipart
            .install(Arc::new(DiskSpoolStrategy::default()))
            .unwrap();
        // Same strategy again: ignored.
        h.ctx
            .multipart
            .install(Arc::new(DiskSpoolStrategy::default()))
            .unwrap();
        // A different one: rejected.
        let err = h
            .ctx
            .multipart
            .install(Arc::new(RenamedStrategy(DiskSpoolStrategy::default())))
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }
}
