use actix_files::NamedFile;
use actix_web::{
    delete, get,
    http::Method,
    post, put,
    web::{self, Data},
    HttpResponse, Responder,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{AuthAdmin, AuthUser, Claims},
    db,
    errors::AppError,
    mortgage::{self, MortgageInput},
    resources::{self, OwnedResource},
    structs::{ChecklistItem, Document, Expense, Note, PublicAdmin, PublicUser},
    utils::validate_password,
    AppState,
};

#[derive(Deserialize)]
pub struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl Credentials {
    fn require_both(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() || self.password.is_empty() {
            return Err(AppError::validation("username and password are required"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_password: String,
}

impl PasswordChange {
    fn validate(&self) -> Result<(), AppError> {
        if self.current_password.is_empty() || self.new_password.is_empty() {
            return Err(AppError::validation(
                "current password and new password are required",
            ));
        }
        validate_password("new password", &self.new_password)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    #[serde(default)]
    new_password: String,
}

fn success(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}

/// Wires every `/api` route onto the app.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(|err, _| {
                AppError::validation(format!("invalid request body: {err}")).into()
            }))
            .app_data(
                web::PathConfig::default()
                    .error_handler(|_, _| AppError::not_found("not found").into()),
            )
            .service(register_handler)
            .service(login_handler)
            .service(change_password_handler)
            .service(calculator_handler)
            .service(admin_login_handler)
            .service(admin_change_password_handler)
            .service(admin_list_users_handler)
            .service(admin_reset_password_handler)
            .service(admin_erase_user_handler)
            .service(admin_stats_handler)
            .configure(|cfg| owned_routes::<Expense>(cfg, "/expenses"))
            .configure(|cfg| owned_routes::<Document>(cfg, "/documents"))
            .configure(|cfg| owned_routes::<Note>(cfg, "/notes"))
            .configure(|cfg| owned_routes::<ChecklistItem>(cfg, "/checklist"))
            .default_service(web::to(api_not_found)),
    );
}

async fn api_not_found() -> Result<HttpResponse, AppError> {
    Err(AppError::not_found("not found"))
}

async fn method_not_allowed() -> Result<HttpResponse, AppError> {
    Err(AppError::MethodNotAllowed)
}

/// Anything outside `/api`: GET falls back to the SPA entry point.
pub async fn default_handler(
    req_method: Method,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    if req_method != Method::GET {
        return Err(AppError::MethodNotAllowed);
    }
    NamedFile::open(state.static_dir.join("index.html"))
        .map_err(|_| AppError::not_found("not found"))
}

#[post("/register")]
pub async fn register_handler(
    web::Json(form): web::Json<Credentials>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    form.require_both()?;
    validate_password("password", &form.password)?;
    let username = form.username.trim();

    let user = db::create_user(&state.db_pool, username, &form.password).await?;
    let token = state.tokens.issue(Claims::for_user(user.id, &user.username))?;

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": PublicUser { id: user.id, username: user.username },
    })))
}

#[post("/login")]
pub async fn login_handler(
    web::Json(form): web::Json<Credentials>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    form.require_both()?;
    let user = db::verify_user_credentials(&state.db_pool, form.username.trim(), &form.password)
        .await
        .map_err(|e| {
            if matches!(e, AppError::Unauthorized(_)) {
                log::info!("Failed login for {:?}", form.username);
            }
            e
        })?;
    let token = state.tokens.issue(Claims::for_user(user.id, &user.username))?;

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "user": PublicUser { id: user.id, username: user.username },
    })))
}

#[put("/change-password")]
pub async fn change_password_handler(
    user: AuthUser,
    web::Json(form): web::Json<PasswordChange>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    form.validate()?;
    db::change_user_password(
        &state.db_pool,
        user.user_id,
        &form.current_password,
        &form.new_password,
    )
    .await?;
    Ok(success("password updated"))
}

#[post("/calculator")]
pub async fn calculator_handler(
    web::Json(input): web::Json<MortgageInput>,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(mortgage::calculate(&input)?))
}

fn owned_routes<R: OwnedResource>(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(
        web::resource(path)
            .route(web::get().to(list_handler::<R>))
            .route(web::post().to(create_handler::<R>))
            .default_service(web::to(method_not_allowed)),
    )
    .service(
        web::resource(format!("{path}/{{id}}"))
            .route(web::put().to(update_handler::<R>))
            .route(web::delete().to(delete_handler::<R>))
            .default_service(web::to(method_not_allowed)),
    );
}

async fn list_handler<R: OwnedResource>(
    user: AuthUser,
    state: Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let rows = resources::list::<R>(&state.db_pool, user.user_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

async fn create_handler<R: OwnedResource>(
    user: AuthUser,
    state: Data<AppState>,
    web::Json(input): web::Json<R::Input>,
) -> Result<HttpResponse, AppError> {
    let row = resources::create::<R>(&state.db_pool, user.user_id, input).await?;
    log::debug!("{} added a {}", user.username, R::KIND);
    Ok(HttpResponse::Ok().json(row))
}

async fn update_handler<R: OwnedResource>(
    user: AuthUser,
    state: Data<AppState>,
    id: web::Path<i64>,
    web::Json(input): web::Json<R::Input>,
) -> Result<HttpResponse, AppError> {
    resources::update::<R>(&state.db_pool, user.user_id, id.into_inner(), input).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

async fn delete_handler<R: OwnedResource>(
    user: AuthUser,
    state: Data<AppState>,
    id: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    resources::delete::<R>(&state.db_pool, user.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[post("/admin/login")]
pub async fn admin_login_handler(
    web::Json(form): web::Json<Credentials>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    form.require_both()?;
    let admin =
        db::verify_admin_credentials(&state.db_pool, form.username.trim(), &form.password).await?;
    let token = state.tokens.issue(Claims::for_admin(admin.id, &admin.username))?;
    log::info!("Admin {} logged in", admin.username);

    Ok(HttpResponse::Ok().json(json!({
        "token": token,
        "admin": PublicAdmin { id: admin.id, username: admin.username, email: admin.email },
    })))
}

#[put("/admin/change-password")]
pub async fn admin_change_password_handler(
    admin: AuthAdmin,
    web::Json(form): web::Json<PasswordChange>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    form.validate()?;
    db::change_admin_password(
        &state.db_pool,
        admin.admin_id,
        &form.current_password,
        &form.new_password,
    )
    .await?;
    Ok(success("admin password updated"))
}

#[get("/admin/users")]
pub async fn admin_list_users_handler(
    _admin: AuthAdmin,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(db::list_users(&state.db_pool).await?))
}

#[put("/admin/users/{user_id}/password")]
pub async fn admin_reset_password_handler(
    admin: AuthAdmin,
    user_id: web::Path<i64>,
    web::Json(form): web::Json<PasswordReset>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    validate_password("new password", &form.new_password)?;
    let user_id = user_id.into_inner();
    db::force_reset_password(&state.db_pool, user_id, &form.new_password).await?;
    log::info!("Admin {} reset the password of user {}", admin.username, user_id);
    Ok(success("user password updated"))
}

#[delete("/admin/users/{user_id}")]
pub async fn admin_erase_user_handler(
    admin: AuthAdmin,
    user_id: web::Path<i64>,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    let user_id = user_id.into_inner();
    log::info!("Admin {} is erasing user {}", admin.username, user_id);
    db::erase_user(&state.db_pool, user_id).await?;
    Ok(success("user and all associated data deleted"))
}

#[get("/admin/stats")]
pub async fn admin_stats_handler(
    _admin: AuthAdmin,
    state: Data<AppState>,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(db::aggregate_stats(&state.db_pool).await?))
}
