//! The `hash` and `verify` commands.
use anyhow::bail;

use hashx::{Error, HashX, HashXBuilder, RuntimeOption};

use crate::config::{Command, Config, Seed};

/// Runs `command`, printing results to stdout.
///
/// # Errors
/// If no instance could be built for the seed, or `verify` found a mismatch.
pub fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Hash { seed, nonce, count } => hash(config, &seed, nonce, count),
        Command::Verify { seed, nonces } => verify(config, &seed, nonces),
    }
}

fn hash(config: &Config, seed: &Seed, first: u64, count: u64) -> anyhow::Result<()> {
    let hashx = HashXBuilder::from(config.hashx_config()).build(&seed.0)?;
    tracing::info!(runtime = ?hashx.runtime(), "built instance");

    for nonce in (0..count).map(|offset| first.wrapping_add(offset)) {
        let digest = hashx.hash(nonce);
        println!("{nonce} {}", hex::encode(digest.to_le_bytes()));
    }

    Ok(())
}

fn verify(config: &Config, seed: &Seed, nonces: u64) -> anyhow::Result<()> {
    let builder = HashXBuilder::from(config.hashx_config());
    let reference = builder
        .clone()
        .runtime(RuntimeOption::InterpretOnly)
        .build(&seed.0)?;

    let mut mismatches = check(&reference, &reference, nonces);

    for runtime in [RuntimeOption::ScalarOnly, RuntimeOption::VectorOnly] {
        let hashx = match builder.clone().runtime(runtime).build(&seed.0) {
            Ok(hashx) => hashx,
            Err(Error::NotAvailable) => {
                tracing::info!(?runtime, "runtime not available, skipping");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if hashx.program() != reference.program() {
            bail!("{runtime:?} generated a different program");
        }

        mismatches += check(&hashx, &reference, nonces);
    }

    if mismatches != 0 {
        bail!("{mismatches} digests differ from the interpreter");
    }

    println!("ok");
    Ok(())
}

/// Compares single and batched digests of `hashx` to single digests of `reference`,
/// returning the number of mismatches.
fn check(hashx: &HashX, reference: &HashX, nonces: u64) -> usize {
    let runtime = hashx.runtime();
    let mut mismatches = 0;
    let mut mismatch = |nonce: u64, path: &str| {
        tracing::error!(?runtime, nonce, path, "digest mismatch");
        mismatches += 1;
    };

    for nonce in 0..nonces {
        if hashx.hash(nonce) != reference.hash(nonce) {
            mismatch(nonce, "single");
        }
    }

    for first in (0..nonces).step_by(8) {
        let batch8 = hashx.hash_batch8(first);
        let batch4 = hashx.hash_batch4(first);

        for (nonce, digest) in (first..).zip(batch8) {
            if digest != reference.hash(nonce) {
                mismatch(nonce, "batch8");
            }
        }
        for (nonce, digest) in (first..).zip(batch4) {
            if digest != reference.hash(nonce) {
                mismatch(nonce, "batch4");
            }
        }
    }

    tracing::info!(?runtime, nonces, mismatches, "checked");
    mismatches
}
