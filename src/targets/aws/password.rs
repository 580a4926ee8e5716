//! Console password generation for temporary IAM login profiles.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::broker::SecretString;

const LENGTH: usize = 20;
const MIN_PUNCTUATION: usize = 5;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
/// Symbols accepted by the default IAM password policy.
const PUNCTUATION: &[u8] = b"!@#$%^&*()_+-=[]{}|'";

/// Generate a password with at least five symbols, one uppercase letter and one digit.
pub fn generate_console_password() -> SecretString {
    generate_with(&mut rand::thread_rng())
}

fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> SecretString {
    let all: Vec<u8> = [LOWER, UPPER, DIGITS, PUNCTUATION].concat();
    let mut chars: Vec<u8> = Vec::with_capacity(LENGTH);

    chars.extend((0..MIN_PUNCTUATION).map(|_| pick(rng, PUNCTUATION)));
    chars.push(pick(rng, UPPER));
    chars.push(pick(rng, DIGITS));
    while chars.len() < LENGTH {
        chars.push(pick(rng, &all));
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect::<String>().into()
}

fn pick<R: Rng + ?Sized>(rng: &mut R, set: &[u8]) -> u8 {
    set[rng.gen_range(0..set.len())]
}
