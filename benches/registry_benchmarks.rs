use criterion::{black_box, criterion_group, criterion_main, Criterion};
use slave_core::dispatch::{DispatchRequest, DispatchRouter};
use slave_core::execution::{
    DelegationListener, ExecutionParameters, ExecutionUnit, LaunchConfiguration, StopMode,
    UnitDefinition, UnitKind,
};
use slave_core::registry::ExecutionRegistry;
use slave_core::{SlaveConfig, SlaveContext};
use std::sync::{Arc, OnceLock};

struct BenchUnit {
    name: String,
    id: OnceLock<String>,
}

impl ExecutionUnit for BenchUnit {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn assign_execution_id(&self, id: &str) -> bool {
        self.id.set(id.to_string()).is_ok()
    }

    fn execution_id(&self) -> Option<String> {
        self.id.get().cloned()
    }

    fn stop(&self, _mode: StopMode) {}

    fn add_delegation_listener(&self, _listener: Arc<dyn DelegationListener>) {}
}

fn unit(name: &str) -> Arc<BenchUnit> {
    Arc::new(BenchUnit {
        name: name.to_string(),
        id: OnceLock::new(),
    })
}

fn launch(name: &str) -> LaunchConfiguration {
    LaunchConfiguration::new(UnitDefinition::new(name), ExecutionParameters::default())
}

fn benchmark_register(c: &mut Criterion) {
    let registry = ExecutionRegistry::new(UnitKind::Transformation);
    c.bench_function("registry_register", |b| {
        b.iter(|| registry.register(unit("load_dim"), launch("load_dim")))
    });
}

fn benchmark_lookup_by_name(c: &mut Criterion) {
    let registry = ExecutionRegistry::new(UnitKind::Transformation);
    for i in 0..1_000 {
        let name = format!("trans-{}", i % 50);
        registry.register(unit(&name), launch(&name));
    }
    c.bench_function("registry_find_first_key", |b| {
        b.iter(|| registry.find_first_key(black_box("trans-25")))
    });
}

fn benchmark_dispatch(c: &mut Criterion) {
    let context = SlaveContext::new(SlaveConfig::default()).unwrap();
    let router: &DispatchRouter = &context.router;
    let request = DispatchRequest::new("/kettle/getSlaves/");
    c.bench_function("router_dispatch", |b| {
        b.iter(|| router.dispatch(black_box(&request)))
    });
}

criterion_group!(
    benches,
    benchmark_register,
    benchmark_lookup_by_name,
    benchmark_dispatch
);
criterion_main!(benches);
