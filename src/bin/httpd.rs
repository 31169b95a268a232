//! CLI entry point: parse `Config`, build the static-file demo `Handler`,
//! and run the server until killed.

use coro_httpd::demo::StaticFileHandler;
use coro_httpd::{Config, Server};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let handler = StaticFileHandler::new(config.root.clone());
    if let Err(fatal) = Server::new(config, handler).run() {
        log::error!("{}", fatal);
        std::process::exit(1);
    }
}
