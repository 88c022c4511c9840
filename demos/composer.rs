//! Composes a small scope tree with `tracing` logging turned on, so the
//! `composer`/`evaluator` spans show up on stderr. Mirrors the teacher's own
//! `examples/composer.rs`, which installs a `FmtSubscriber` before driving
//! its `Composer`.

use std::rc::Rc;

use mixject::prelude::*;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::FmtSubscriber;

fn main() {
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_max_level(LevelFilter::DEBUG).finish()).unwrap();

    let base = Builder::new("base")
        .resource("max_connections", vec![], Flags::default(), Rc::new(|_: &Args| Ok(Value::new(10i64))))
        .build_one();
    let high_load = Builder::new("high_load")
        .patch(
            "max_connections",
            vec![],
            Flags::default(),
            Rc::new(|prev: Value, _: &Args| Ok(Value::new(prev.downcast_ref::<i64>().unwrap() * 2))),
        )
        .build_one();

    let composed = evaluate(&[base, high_load]).unwrap();
    let max_connections = composed.get("max_connections").unwrap();
    println!("max_connections = {}", max_connections.downcast_ref::<i64>().unwrap());
}
