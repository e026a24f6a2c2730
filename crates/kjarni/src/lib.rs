//! # Kjarni — Archetype ECS Runtime
//!
//! The entity/component/system core of a game engine: component registry,
//! archetype storage, a predicate query language, and a dependency-ordered
//! stage scheduler. Rendering, physics and the rest are meant to be built on
//! top as components and systems.
//!
//! Start with `use kjarni::prelude::*` and build an [`App`](app::App), or
//! drive a [`World`](ecs::World) and [`Scheduler`](ecs::Scheduler) by hand.
//!
//! ## Features
//!
//! - `diagnostics` (default) — per-system timings and [`WorldStats`](ecs::WorldStats).

pub mod app;
pub mod config;
pub mod ecs;
pub mod error;
pub mod math;
pub mod prelude;
pub mod scene;
pub mod time;
