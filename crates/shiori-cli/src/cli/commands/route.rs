//! Route command handler.

use shiori_core::config::Config;
use shiori_core::routing::{self, RouteDecision};

pub fn run(config: &Config, path: &str, session: bool, user_agent: Option<&str>) {
    match routing::route(&config.pages, path, session, user_agent) {
        RouteDecision::Redirect(target) => println!("redirect {target}"),
        RouteDecision::Rewrite(target) => println!("rewrite {target}"),
        RouteDecision::Next => println!("next {path}"),
    }
}
