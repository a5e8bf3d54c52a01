use actix_web::{middleware::Logger, web, App, HttpServer};

use prova_server::{
    app_state::AppState, auth::OptionalAuthMiddleware, config::Config, handlers,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    let bind_addr = (config.web_server_host.clone(), config.web_server_port);

    let state = AppState::new(config)
        .await
        .expect("failed to initialize application state");
    let jwt_data = web::Data::from(state.jwt_service.clone());

    log::info!("Starting server on {}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(jwt_data.clone())
            .wrap(Logger::default())
            .wrap(OptionalAuthMiddleware)
            .service(handlers::health_check)
            .service(handlers::start_attempt)
            .service(handlers::next_question)
            .service(handlers::answer)
            .service(handlers::submit)
            .service(handlers::cancel)
            .service(handlers::list_attempts)
            .service(handlers::attempt_details)
            .service(handlers::grade_answer)
    })
    .bind(bind_addr)?
    .run()
    .await
}
