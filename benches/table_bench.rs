use criterion::{black_box, criterion_group, criterion_main, Criterion};
use opportune::{ActionId, GeneralizedAction, GeneralizedState, ParticipantId, StateId, ValueTable};

fn seeded_table(states: usize, actions: usize) -> ValueTable {
    let me = ParticipantId::new("x");
    let mut table = ValueTable::new();
    for s in 0..states {
        let state = GeneralizedState::single(me.clone(), StateId::new(format!("s{}", s)));
        let seeds = (0..actions).map(|a| {
            GeneralizedAction::single(me.clone(), ActionId::new(format!("a{}", a)))
        });
        table.ensure_state(&state, seeds);
    }
    table
}

fn bench_ensure_state(c: &mut Criterion) {
    let me = ParticipantId::new("x");
    c.bench_function("ensure_state_seeded", |b| {
        let mut table = seeded_table(100, 4);
        let state = GeneralizedState::single(me.clone(), StateId::new("s50"));
        let seeds: Vec<GeneralizedAction> = (0..4)
            .map(|a| GeneralizedAction::single(me.clone(), ActionId::new(format!("a{}", a))))
            .collect();
        b.iter(|| {
            table.ensure_state(black_box(&state), seeds.iter().cloned());
        });
    });
}

fn bench_apply_td(c: &mut Criterion) {
    let me = ParticipantId::new("x");
    c.bench_function("apply_td", |b| {
        let mut table = seeded_table(100, 4);
        let state = GeneralizedState::single(me.clone(), StateId::new("s50"));
        let action = GeneralizedAction::single(me.clone(), ActionId::new("a2"));
        b.iter(|| {
            table.apply_td(black_box(&state), black_box(&action), 1.0, 0.5, 0.3, 0.9);
        });
    });
}

fn bench_max_value_scan(c: &mut Criterion) {
    c.bench_function("max_value_over_states", |b| {
        let table = seeded_table(500, 8);
        b.iter(|| {
            let mut best = f64::NEG_INFINITY;
            for state in table.states() {
                if let Some(v) = table.max_value(state) {
                    best = best.max(v);
                }
            }
            black_box(best)
        });
    });
}

fn bench_joint_key_projection(c: &mut Criterion) {
    c.bench_function("joint_key_projection", |b| {
        let joint = GeneralizedState::single(ParticipantId::new("a"), StateId::new("s1"))
            .with(ParticipantId::new("b"), StateId::new("s2"))
            .with(ParticipantId::new("c"), StateId::new("s3"))
            .with(ParticipantId::new("d"), StateId::new("s4"));
        let subset = [ParticipantId::new("a"), ParticipantId::new("c")];
        b.iter(|| black_box(&joint).project(subset.iter()));
    });
}

criterion_group!(
    benches,
    bench_ensure_state,
    bench_apply_td,
    bench_max_value_scan,
    bench_joint_key_projection
);
criterion_main!(benches);
