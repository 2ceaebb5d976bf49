//! Benchmark for the automaton step, the simulation's hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use petri::game::automaton::advance;
use petri::game::config::GameConfig;
use petri::game::world::World;
use petri::GameMode;

fn bench_advance(c: &mut Criterion) {
    for (width, height) in [(32u16, 32u16), (128, 128)] {
        let config = GameConfig {
            grid_width: width,
            grid_height: height,
            noise: true,
            survival: [10, 30, 80, 90, 40, 20, 10, 5, 0],
            birth: [0, 5, 20, 90, 30, 10, 5, 0, 0],
            ..GameConfig::default()
        };
        let mut world = World::new(config, GameMode::Conquest, 4, 42).unwrap();
        world.start_round();

        c.bench_function(&format!("advance_{width}x{height}"), |b| {
            b.iter(|| advance(black_box(&mut world)))
        });
    }
}

criterion_group!(benches, bench_advance);
criterion_main!(benches);
