use crate::db::{DbExecutor, Store};
use crate::http::{self, catalog, ideas, users, votes};
use crate::services::{idea::IdeaService, vote::VoteActor};
use actix::prelude::*;
use actix::registry::SystemRegistry;
use actix_web::web;
use std::sync::Arc;

pub fn register_db_actor(store: Arc<dyn Store>) {
    SystemRegistry::set(DbExecutor(store).start());
}

pub fn register_system_actors(store: Arc<dyn Store>) {
    register_db_actor(store.clone());
    SystemRegistry::set(VoteActor::new(store).start());
    SystemRegistry::set(IdeaService::new().start());
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    http::configure_extractors(cfg);
    cfg.service(
        web::scope("/api")
            .route("", web::get().to(http::health))
            .route("/", web::get().to(http::health))
            .service(
                web::scope("/ideas")
                    .route("", web::get().to(ideas::list))
                    .route("", web::post().to(ideas::create))
                    .route("/count", web::get().to(ideas::count))
                    .route("/{id}", web::get().to(ideas::get))
                    .route("/{id}", web::put().to(ideas::update))
                    .route("/{id}", web::delete().to(ideas::delete))
                    .route("/{id}/upvote", web::post().to(votes::upvote))
                    .route("/{id}/downvote", web::post().to(votes::downvote))
                    .route("/{id}/upvotes", web::get().to(votes::idea_upvotes))
                    .route("/{id}/downvotes", web::get().to(votes::idea_downvotes)),
            )
            .route("/upvotes", web::delete().to(votes::remove_upvote))
            .route("/downvotes", web::delete().to(votes::remove_downvote))
            .service(
                web::scope("/tags")
                    .route("", web::get().to(catalog::list_tags))
                    .route("", web::post().to(catalog::create_tag))
                    .route("/count", web::get().to(catalog::count_tags))
                    .route("/{id}", web::get().to(catalog::get_tag))
                    .route("/{id}", web::put().to(catalog::rename_tag))
                    .route("/{id}", web::delete().to(catalog::delete_tag)),
            )
            .service(
                web::scope("/targets")
                    .route("", web::get().to(catalog::list_targets))
                    .route("", web::post().to(catalog::create_target))
                    .route("/count", web::get().to(catalog::count_targets))
                    .route("/{id}", web::get().to(catalog::get_target))
                    .route("/{id}", web::put().to(catalog::rename_target))
                    .route("/{id}", web::delete().to(catalog::delete_target)),
            )
            .service(
                web::scope("/users")
                    .route("", web::get().to(users::list))
                    .route("", web::post().to(users::register))
                    .route("/{id}", web::get().to(users::get))
                    .route("/{id}", web::put().to(users::update))
                    .route("/{id}", web::delete().to(users::delete))
                    .route("/{id}/upvotes", web::get().to(votes::user_upvotes))
                    .route("/{id}/downvotes", web::get().to(votes::user_downvotes)),
            ),
    );
}
