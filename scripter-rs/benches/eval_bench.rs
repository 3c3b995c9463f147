use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scripter::script::{Interpreter, Value};

const FIB: &str = "function fib(n) { if (n < 2) { return n } return fib(n - 1) + fib(n - 2) }";

const LOOP: &str = "\
total = 0
for (var i = 0; i < 1000; i++) { total += i % 7 }
";

fn bench_eval(c: &mut Criterion) {
    let mut g = c.benchmark_group("eval");

    let mut interp = Interpreter::new();
    interp.exec_script(FIB).unwrap();
    g.bench_function("fib_15", |b| {
        b.iter(|| interp.call_function("fib", vec![black_box(Value::Number(15.0))]).unwrap())
    });

    let mut interp = Interpreter::new();
    let program = interp.parse(LOOP).unwrap();
    g.bench_function("for_loop_1000", |b| b.iter(|| interp.run(black_box(&program)).unwrap()));

    let interp = Interpreter::new();
    g.bench_function("parse_fib", |b| b.iter(|| interp.parse(black_box(FIB)).unwrap()));

    g.finish();
}

criterion_group!(benches, bench_eval);
criterion_main!(benches);
