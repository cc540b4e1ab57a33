use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use vault_core::crypto::{DataEncryptionKey, KdfParams, aead_decrypt, aead_encrypt, derive_master_key, derive_wrap_key, wrap_dek};

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_generation");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("random_dek", |b| {
        b.iter(|| black_box(DataEncryptionKey::generate()));
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");
    group.measurement_time(Duration::from_secs(30)); // KDF is intentionally slow

    let passwords = [
        "short",
        "medium_length_password",
        "very_long_password_that_might_be_used_by_someone",
    ];

    let kdf_configs = vec![
        (
            "fast_argon2id",
            KdfParams::Argon2id {
                salt: vec![0u8; 16],
                m_cost_kib: 4096,
                t_cost: 1,
                p_cost: 1,
            },
        ),
        ("default_argon2id", KdfParams::new_default(true)),
        (
            "pbkdf2_fallback",
            KdfParams::Pbkdf2HmacSha256 {
                salt: vec![0u8; 16],
                rounds: 480_000,
            },
        ),
    ];

    for (config_name, kdf_params) in kdf_configs {
        for password in &passwords {
            group.bench_with_input(
                BenchmarkId::new(config_name, password.len()),
                &(password, &kdf_params),
                |b, &(password, kdf_params)| {
                    b.iter(|| black_box(derive_master_key(password, kdf_params).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_key_wrapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_wrapping");
    group.measurement_time(Duration::from_secs(10));

    let params = KdfParams::Argon2id {
        salt: vec![0u8; 16],
        m_cost_kib: 4096,
        t_cost: 1,
        p_cost: 1,
    };
    let master_key = derive_master_key("benchmark-password", &params).unwrap();
    let wrap_key = derive_wrap_key(&master_key).unwrap();

    group.bench_function("wrap_dek", |b| {
        b.iter(|| {
            let dek = DataEncryptionKey::generate();
            black_box(wrap_dek(&wrap_key, &dek, b"item-bench").unwrap())
        });
    });

    let dek = DataEncryptionKey::generate();
    let wrapped = wrap_dek(&wrap_key, &dek, b"item-bench").unwrap();

    group.bench_function("unwrap_dek", |b| {
        b.iter(|| black_box(vault_core::crypto::unwrap_dek(&wrap_key, &wrapped, b"item-bench").unwrap()));
    });

    group.finish();
}

fn bench_aead_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("aead_operations");
    group.measurement_time(Duration::from_secs(10));

    let key = DataEncryptionKey::generate();
    let associated_data = b"test associated data";

    let data_sizes = [16, 256, 1024, 8192, 65536];

    for &size in &data_sizes {
        let plaintext = vec![0u8; size];

        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, plaintext| {
            b.iter(|| black_box(aead_encrypt(&key.0, plaintext, associated_data).unwrap()));
        });

        let blob = aead_encrypt(&key.0, &plaintext, associated_data).unwrap();

        group.bench_with_input(BenchmarkId::new("decrypt", size), &blob, |b, blob| {
            b.iter(|| black_box(aead_decrypt(&key.0, blob, associated_data).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_generation,
    bench_key_derivation,
    bench_key_wrapping,
    bench_aead_operations
);
criterion_main!(benches);
