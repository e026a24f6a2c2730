//! Gravity — a handful of falling bodies driven by ordered systems.
//!
//! `Gravity` accelerates every body, `Integrate` moves it, and a closure
//! system bounces anything that hits the floor. `Integrate` declares
//! `after::<Gravity>()`, so it is registered first here on purpose.
//!
//! Run with: `RUST_LOG=debug cargo run -p kjarni --example gravity`

use std::time::Duration;

use kjarni::prelude::*;

#[derive(Debug, Clone, Copy)]
struct Velocity(Vec3);

#[derive(Debug, Clone, Copy)]
struct Bounciness(f32);

struct Gravity {
    bodies: EntityQuery,
    g: f32,
}

impl System for Gravity {
    fn queries_mut(&mut self) -> Vec<&mut EntityQuery> {
        vec![&mut self.bodies]
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        let dv = self.g * ctx.delta_secs();
        ctx.world.for_each_mut(&mut self.bodies, |mut body| {
            if let Some(velocity) = body.get_mut::<Velocity>() {
                velocity.0.y -= dv;
            }
        });
    }
}

struct Integrate {
    movers: EntityQuery,
}

impl System for Integrate {
    fn dependencies(&self) -> Vec<SystemDependency> {
        vec![SystemDependency::after::<Gravity>()]
    }

    fn queries_mut(&mut self) -> Vec<&mut EntityQuery> {
        vec![&mut self.movers]
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_, '_>) {
        let dt = ctx.delta_secs();
        ctx.world.for_each_mut(&mut self.movers, |mut body| {
            let Some(&Velocity(v)) = body.get::<Velocity>() else {
                return;
            };
            if let Some(transform) = body.get_mut::<Transform>() {
                transform.translation += v * dt;
            }
        });
    }
}

fn main() {
    env_logger::init();

    let movers = || EntityQuery::new(QueryPredicate::has_all::<(Transform, Velocity)>());

    let mut app = App::new();
    app.plugin(HierarchyPlugin)
        .add_system(Integrate { movers: movers() })
        .add_system(Gravity {
            bodies: movers(),
            g: 9.81,
        })
        .add_system(
            system_fn("floor", |ctx| {
                let mut query = EntityQuery::new(QueryPredicate::has::<Bounciness>());
                ctx.world.for_each_mut(&mut query, |mut body| {
                    let bounce = body.get::<Bounciness>().map_or(0.0, |b| b.0);
                    let below = body.get::<Transform>().is_some_and(|t| t.translation.y < 0.0);
                    if below {
                        if let Some(transform) = body.get_mut::<Transform>() {
                            transform.translation.y = 0.0;
                        }
                        if let Some(velocity) = body.get_mut::<Velocity>() {
                            velocity.0.y = -velocity.0.y * bounce;
                        }
                    }
                });
            })
            .after(std::any::type_name::<Integrate>()),
        );

    for (i, bounce) in [0.0, 0.5, 0.9].into_iter().enumerate() {
        app.world_mut().spawn(
            format!("ball{i}"),
            (
                Transform::from_xy(i as f32 * 2.0, 10.0),
                Velocity(Vec3::ZERO),
                Bounciness(bounce),
            ),
        );
    }

    if let Err(err) = app.initialize() {
        log::error!("{err}");
        return;
    }

    for frame in 0..240 {
        app.update_with_delta(Duration::from_secs_f32(1.0 / 60.0));
        if frame % 60 == 59 {
            let mut balls = EntityQuery::new(QueryPredicate::has::<Bounciness>());
            for ball in app.world().query(&mut balls) {
                let y = ball.get::<Transform>().map_or(0.0, |t| t.translation.y);
                println!("t={:.1}s {:>6} y={y:.2}", (frame + 1) as f32 / 60.0, ball.name());
            }
        }
    }
}
