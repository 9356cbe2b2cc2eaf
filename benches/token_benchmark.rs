use std::hint::black_box;
use std::sync::Arc;

use chrono::TimeDelta;
use criterion::{Criterion, criterion_group, criterion_main};
use relay::clock::SystemClock;
use relay::crypto::{AesGcmCipher, SelectedCipher, SigningKey, SymmetricKey};
use relay::token::{Purpose, TokenManager};

fn manager(cipher: SelectedCipher) -> TokenManager {
    TokenManager::hmac(
        Purpose::Authentication,
        SigningKey::new("benchmark").unwrap(),
        cipher,
        Arc::new(SystemClock),
        TimeDelta::minutes(5),
    )
}

fn aes() -> SelectedCipher {
    AesGcmCipher::new(SymmetricKey::from_bytes([42; 32]).unwrap()).into()
}

fn issue_benchmark(c: &mut Criterion) {
    let signed = manager(SelectedCipher::default());
    c.bench_function("issue signed", |b| {
        b.iter(|| signed.issue(black_box("user")))
    });

    let encrypted = manager(aes());
    c.bench_function("issue encrypted", |b| {
        b.iter(|| encrypted.issue(black_box("user")))
    });
}

fn verify_benchmark(c: &mut Criterion) {
    let signed = manager(SelectedCipher::default());
    let token = signed.issue("user").unwrap();
    c.bench_function("verify signed", |b| {
        b.iter(|| signed.verify(black_box(&token)))
    });

    let encrypted = manager(aes());
    let token = encrypted.issue("user").unwrap();
    c.bench_function("verify encrypted", |b| {
        b.iter(|| encrypted.verify(black_box(&token)))
    });
}

criterion_group!(benches, issue_benchmark, verify_benchmark);
criterion_main!(benches);
