pub mod status;

use crate::scenario::RunState;
use actix_web::{dev::ServerHandle, web, App, HttpServer};
use std::{net::SocketAddr, sync::Arc};

/// Starts the status server on the current tokio runtime and returns a handle to stop it.
pub fn serve(addr: SocketAddr, state: Arc<RunState>) -> std::io::Result<ServerHandle> {
    let state = web::Data::from(state);

    let server = HttpServer::new(move || {
        App::new()
            .service(status::index)
            .service(status::get_checkers)
            .service(status::get_phases)
            .app_data(state.clone())
    })
    .workers(1)
    .bind(addr)?
    .run();

    let handle = server.handle();
    tokio::spawn(server);
    Ok(handle)
}
