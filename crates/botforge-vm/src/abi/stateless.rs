//! Pure math externals. Angles are in degrees.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{
    arg_f32, arg_u32, ids, put_f32, put_u32, signature, AbiError, ExternalBody, ExternalTable,
};

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(signature(ids::SQRT, "sqrt", 4, 4), ExternalBody::Stateless(Box::new(sqrt)));
    table.insert(signature(ids::SIN, "sin", 4, 4), ExternalBody::Stateless(Box::new(sin)));
    table.insert(signature(ids::COS, "cos", 4, 4), ExternalBody::Stateless(Box::new(cos)));
    table.insert(signature(ids::ATAN2, "atan2", 8, 4), ExternalBody::Stateless(Box::new(atan2)));
    table.insert(
        signature(ids::RANDOM, "random", 4, 4),
        ExternalBody::Stateless(Box::new(random_word)),
    );
}

fn sqrt(args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    put_f32(ret, 0, arg_f32(args, 0).sqrt());
    Ok(())
}

fn sin(args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    put_f32(ret, 0, arg_f32(args, 0).to_radians().sin());
    Ok(())
}

fn cos(args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    put_f32(ret, 0, arg_f32(args, 0).to_radians().cos());
    Ok(())
}

/// `atan2(y, x)` in degrees.
fn atan2(args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let (y, x) = (arg_f32(args, 0), arg_f32(args, 1));
    put_f32(ret, 0, y.atan2(x).to_degrees());
    Ok(())
}

fn random_word(args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    put_u32(ret, 0, random(arg_u32(args, 0)));
    Ok(())
}

/// Deterministic pseudo-random word for `seed`. Programs chain calls by
/// feeding the previous result back in.
pub fn random(seed: u32) -> u32 {
    ChaCha8Rng::seed_from_u64(u64::from(seed)).next_u32()
}
