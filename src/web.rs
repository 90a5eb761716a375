use crate::{
    app::{AddOutcome, AppBackend, AppError, AppLocal, ScoredContact},
    cli::validation,
    contacts::{self, Contact, ContactCreate, ContactUpdate, SearchQuery, Sheet},
    semantic::SemanticSearchError,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt::Write as _, sync::Arc};
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<AppLocal>,
}

pub fn router(app: Arc<AppLocal>) -> Router {
    let shared_state = Arc::new(SharedState { app });

    Router::new()
        .route("/", get(index))
        .route("/contacts", post(form_create))
        .route("/contacts/:id/update", post(form_update))
        .route("/contacts/:id/delete", post(form_delete))
        .route("/export/:sheet", get(export))
        .route("/api/contacts/search", post(search))
        .route("/api/contacts/create", post(create))
        .route("/api/contacts/update", post(update))
        .route("/api/contacts/delete", post(delete))
        .route("/api/contacts/total", get(total))
        .route("/api/contacts/semantic_search", post(semantic_search))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .layer(tower_http::set_header::SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(app: Arc<AppLocal>, listen_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("listening on {listen_addr}");

    axum::serve(listener, router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Blocks until the server is shut down. The caller keeps its own handle on
/// `app` so the blocking http clients inside it are dropped outside the runtime.
pub fn start_daemon(app: Arc<AppLocal>, listen_addr: &str) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(app, listen_addr).await })
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyExists(_) => StatusCode::CONFLICT,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Semantic(SemanticSearchError::Disabled) => StatusCode::BAD_REQUEST,
            AppError::Semantic(_) => {
                log::error!("{self:?}");
                StatusCode::BAD_GATEWAY
            }
            AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn validate_form(name: Option<&str>, number: Option<&str>) -> Result<(), AppError> {
    let name = name.map(str::to_string);
    let number = number.map(str::to_string);
    validation::validate_contact_update(&name, &number)
        .map_err(|err| AppError::InvalidInput(err.to_string()))
}

// --- JSON API ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub sheet: Sheet,

    #[serde(flatten)]
    pub query: SearchQuery,

    /// Order by name instead of insertion order
    #[serde(default)]
    pub sorted: bool,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<Contact>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let mut contacts = app.search(payload.sheet, payload.query)?;
        if payload.sorted {
            sort_by_name(&mut contacts);
        }
        Ok(Json(contacts))
    })
}

async fn create(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<ContactCreate>,
) -> Result<(StatusCode, Json<AddOutcome>), HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        validate_form(Some(&payload.name), Some(&payload.number))?;
        let outcome = app.add(payload)?;
        Ok((StatusCode::CREATED, Json(outcome)))
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateRequest {
    pub id: u64,
    #[serde(flatten)]
    pub update: ContactUpdate,
}

async fn update(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<Contact>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        validate_form(payload.update.name.as_deref(), payload.update.number.as_deref())?;
        Ok(Json(app.update(payload.id, payload.update)?))
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeleteRequest {
    pub id: u64,
    #[serde(default)]
    pub sheet: Sheet,
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<()>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || Ok(Json(app.delete(payload.sheet, payload.id)?)))
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TotalResponse {
    pub primary: usize,
    pub repeating: usize,
}

async fn total(State(state): State<Arc<SharedState>>) -> Result<Json<TotalResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        Ok(Json(TotalResponse {
            primary: app.total(Sheet::Primary)?,
            repeating: app.total(Sheet::Repeating)?,
        }))
    })
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SemanticSearchRequest {
    pub text: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

async fn semantic_search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SemanticSearchRequest>,
) -> Result<Json<Vec<ScoredContact>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        validation::validate_threshold(payload.threshold)
            .map_err(|err| AppError::InvalidInput(err.to_string()))?;
        Ok(Json(app.semantic_search(
            &payload.text,
            payload.limit,
            payload.threshold,
        )?))
    })
}

async fn export(
    State(state): State<Arc<SharedState>>,
    Path(sheet): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let sheet = sheet
        .parse::<Sheet>()
        .map_err(|err| AppError::InvalidInput(err.to_string()))?;

    let app = state.app.clone();

    let body = tokio::task::block_in_place(move || -> Result<Vec<u8>, AppError> {
        let contacts = app.search(sheet, SearchQuery::default())?;
        Ok(contacts::to_csv_bytes(&contacts)?)
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", sheet.file_name()),
            ),
        ],
        body,
    ))
}

// --- HTML form UI ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexParams {
    /// Free text filter for the contact table
    #[serde(default)]
    pub q: Option<String>,
    /// Number to look up for edit/delete
    #[serde(default)]
    pub lookup: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
}

fn sort_by_name(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
}

fn redirect_with(key: &str, message: &str) -> Redirect {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, message)
        .finish();
    Redirect::to(&format!("/?{query}"))
}

/// Expected failures go back to the page as a message, the rest become a 500.
fn form_result(result: Result<String, AppError>) -> Result<Redirect, HttpError> {
    match result {
        Ok(message) => Ok(redirect_with("msg", &message)),
        Err(err @ (AppError::NotFound | AppError::AlreadyExists(_) | AppError::InvalidInput(_))) => {
            Ok(redirect_with("error", &err.to_string()))
        }
        Err(err) => Err(HttpError(err)),
    }
}

fn add_from_form(app: &AppLocal, form: ContactForm) -> Result<String, AppError> {
    if form.name.trim().is_empty() || form.number.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Please enter both name and number.".to_string(),
        ));
    }
    validate_form(Some(&form.name), Some(&form.number))?;

    let outcome = app.add(ContactCreate {
        name: form.name,
        number: form.number,
    })?;

    Ok(match outcome.sheet {
        Sheet::Primary => "Contact added successfully!".to_string(),
        Sheet::Repeating => {
            "This number already exists. Contact added to the repeating sheet!".to_string()
        }
    })
}

fn update_from_form(app: &AppLocal, id: u64, form: ContactForm) -> Result<String, AppError> {
    validate_form(Some(&form.name), Some(&form.number))?;
    app.update(
        id,
        ContactUpdate {
            name: Some(form.name),
            number: Some(form.number),
        },
    )?;
    Ok("Contact updated successfully!".to_string())
}

async fn form_create(
    State(state): State<Arc<SharedState>>,
    Form(form): Form<ContactForm>,
) -> Result<Redirect, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || form_result(add_from_form(&app, form)))
}

async fn form_update(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
    Form(form): Form<ContactForm>,
) -> Result<Redirect, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || form_result(update_from_form(&app, id, form)))
}

async fn form_delete(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<u64>,
) -> Result<Redirect, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        form_result(
            app.delete(Sheet::Primary, id)
                .map(|_| "Contact deleted successfully!".to_string()),
        )
    })
}

async fn index(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<IndexParams>,
) -> Result<Html<String>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        let keyword = params.q.clone().filter(|q| !q.trim().is_empty());

        // the search box filters both tables
        let filtered = |sheet: Sheet| -> Result<Vec<Contact>, AppError> {
            let mut contacts = app.search(
                sheet,
                SearchQuery {
                    keyword: keyword.clone(),
                    ..Default::default()
                },
            )?;
            sort_by_name(&mut contacts);
            Ok(contacts)
        };
        let primary = filtered(Sheet::Primary)?;
        let repeating = filtered(Sheet::Repeating)?;

        let lookup = match params.lookup.as_deref().map(str::trim) {
            Some(number) if !number.is_empty() => {
                Some((number.to_string(), app.find_by_number(number)?))
            }
            _ => None,
        };

        Ok(Html(render_page(&PageView {
            params: &params,
            primary: &primary,
            repeating: &repeating,
            lookup,
            semantic_enabled: app.semantic_enabled(),
        })))
    })
}

struct PageView<'a> {
    params: &'a IndexParams,
    primary: &'a [Contact],
    repeating: &'a [Contact],
    lookup: Option<(String, Option<Contact>)>,
    semantic_enabled: bool,
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const PAGE_STYLE: &str = "body{margin:0;font-family:sans-serif;background:#f0f2f6;display:flex}\
aside{width:280px;padding:16px;background:#fff;min-height:100vh}\
main{flex:1;padding:16px 32px}\
input{display:block;width:100%;margin:4px 0 8px;padding:6px;box-sizing:border-box}\
button{background:#4CAF50;color:#fff;border:0;padding:8px 12px;cursor:pointer}\
button.danger{background:#c0392b}\
table{border-collapse:collapse;width:100%;background:#fff;margin-bottom:24px}\
td,th{border:1px solid #ddd;padding:6px;text-align:left}\
.msg{background:#d4edda;padding:8px}.error{background:#f8d7da;padding:8px}";

fn render_table(out: &mut String, contacts: &[Contact]) {
    if contacts.is_empty() {
        out.push_str("<p>No contacts.</p>");
        return;
    }

    out.push_str("<table><tr><th>Name</th><th>Number</th><th>Last Updated</th></tr>");
    for contact in contacts {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&contact.name),
            escape_html(&contact.number),
            escape_html(&contact.last_updated),
        );
    }
    out.push_str("</table>");
}

fn render_page(view: &PageView) -> String {
    let mut out = String::new();

    let _ = write!(
        out,
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>Contact Manager</title>\
         <style>{PAGE_STYLE}</style></head><body><aside>"
    );

    out.push_str(
        "<h2>Add New Contact</h2><form method=\"post\" action=\"/contacts\">\
         <label>Name<input name=\"name\"></label>\
         <label>Number<input name=\"number\"></label>\
         <button type=\"submit\">Add Contact</button></form>",
    );

    let lookup_value = view
        .lookup
        .as_ref()
        .map(|(number, _)| escape_html(number))
        .unwrap_or_default();
    let _ = write!(
        out,
        "<h3>Edit or Delete Contact</h3><form method=\"get\" action=\"/\">\
         <label>Search by contact number<input name=\"lookup\" value=\"{lookup_value}\"></label>\
         <button type=\"submit\">Find</button></form>"
    );

    match &view.lookup {
        Some((_, Some(contact))) => {
            let _ = write!(
                out,
                "<form method=\"post\" action=\"/contacts/{id}/update\">\
                 <label>Edit Name<input name=\"name\" value=\"{name}\"></label>\
                 <label>Edit Number<input name=\"number\" value=\"{number}\"></label>\
                 <button type=\"submit\">Update Contact</button></form>\
                 <form method=\"post\" action=\"/contacts/{id}/delete\">\
                 <button class=\"danger\" type=\"submit\">Delete Contact</button></form>",
                id = contact.id,
                name = escape_html(&contact.name),
                number = escape_html(&contact.number),
            );
        }
        Some((_, None)) => out.push_str("<p class=\"error\">No contact found with this number.</p>"),
        None => {}
    }

    out.push_str("</aside><main><h1>Contact Manager</h1>");

    if let Some(msg) = &view.params.msg {
        let _ = write!(out, "<p class=\"msg\">{}</p>", escape_html(msg));
    }
    if let Some(error) = &view.params.error {
        let _ = write!(out, "<p class=\"error\">{}</p>", escape_html(error));
    }

    let q = view
        .params
        .q
        .as_deref()
        .map(escape_html)
        .unwrap_or_default();
    let _ = write!(
        out,
        "<form method=\"get\" action=\"/\"><input name=\"q\" value=\"{q}\" \
         placeholder=\"Search both sheets by name or number\"><button type=\"submit\">Search</button></form>"
    );
    if view.semantic_enabled {
        out.push_str("<p>Semantic lookup is available at <code>POST /api/contacts/semantic_search</code>.</p>");
    }

    let _ = write!(out, "<h2>Contacts ({})</h2>", view.primary.len());
    render_table(&mut out, view.primary);

    let _ = write!(out, "<h2>Repeating Contacts ({})</h2>", view.repeating.len());
    render_table(&mut out, view.repeating);

    out.push_str(
        "<p><a href=\"/export/primary\">Download contacts (CSV)</a> · \
         <a href=\"/export/repeating\">Download repeating contacts (CSV)</a></p>\
         </main></body></html>",
    );

    out
}
