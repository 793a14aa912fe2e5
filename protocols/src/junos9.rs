//! Junos `$9$` reversible secret encoding.
//!
//! A `$9$` string is the magic prefix, one salt character, `3 - family(salt)` filler
//! characters, then every plaintext byte spelled out as a run of "gaps" between
//! consecutive alphabet characters. Gap weights rotate through [`ENCODING`].

use thiserror::Error;

pub const MAGIC: &str = "$9$";

const FAMILY: [&str; 4] = [
    "QzF3n6/9CAtpu0O",
    "B1IREhcSyrleKvMW8LXx",
    "7N-dVbwsY2g4oaJZGUDj",
    "iHkq.mPf5T",
];

/// The four families concatenated, in order.
const ALPHABET: &[u8] = b"QzF3n6/9CAtpu0OB1IREhcSyrleKvMW8LXx7N-dVbwsY2g4oaJZGUDjiHkq.mPf5T";

const ENCODING: [&[u32]; 7] = [
    &[1, 4, 32],
    &[1, 16, 32],
    &[1, 8, 32],
    &[1, 64],
    &[1, 32],
    &[1, 4, 16, 128],
    &[1, 32, 64],
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Junos9Error {
    #[error("missing `$9$` prefix")]
    MissingMagic,

    #[error("ran out of characters: expected {expected}, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("character `{0}` is not part of the $9$ alphabet")]
    InvalidChar(char),

    #[error("salt `{salt}` needs {expected} random characters, got {found}")]
    RandLength {
        salt: char,
        expected: usize,
        found: usize,
    },

    #[error("character `{0}` cannot be encoded")]
    Unencodable(char),
}

fn position(c: u8) -> Result<usize, Junos9Error> {
    ALPHABET
        .iter()
        .position(|&a| a == c)
        .ok_or(Junos9Error::InvalidChar(c as char))
}

/// Number of filler characters that follow a given salt.
fn extra(salt: u8) -> Result<usize, Junos9Error> {
    FAMILY
        .iter()
        .position(|family| family.as_bytes().contains(&salt))
        .map(|idx| 3 - idx)
        .ok_or(Junos9Error::InvalidChar(salt as char))
}

fn gap(from: u8, to: u8) -> Result<i64, Junos9Error> {
    let diff = position(to)? as i64 - position(from)? as i64;
    Ok(diff.rem_euclid(ALPHABET.len() as i64) - 1)
}

pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(MAGIC)
}

/// Decodes a full `$9$...` string.
pub fn decrypt(crypt: &str) -> Result<String, Junos9Error> {
    let body = crypt.strip_prefix(MAGIC).ok_or(Junos9Error::MissingMagic)?;
    decrypt_body(body)
}

/// Decodes the part after the `$9$` prefix.
pub fn decrypt_body(body: &str) -> Result<String, Junos9Error> {
    let bytes = body.as_bytes();
    let (&salt, rest) = bytes
        .split_first()
        .ok_or(Junos9Error::Truncated { expected: 1, found: 0 })?;

    let skip = extra(salt)?;
    if rest.len() < skip {
        return Err(Junos9Error::Truncated {
            expected: skip,
            found: rest.len(),
        });
    }

    let mut chars = &rest[skip..];
    let mut prev = salt;
    let mut plain = String::new();
    let mut idx = 0;

    while !chars.is_empty() {
        let weights = ENCODING[idx % ENCODING.len()];
        if chars.len() < weights.len() {
            return Err(Junos9Error::Truncated {
                expected: weights.len(),
                found: chars.len(),
            });
        }
        let (nibble, tail) = chars.split_at(weights.len());

        let mut num: i64 = 0;
        for (&c, &weight) in nibble.iter().zip(weights) {
            num += gap(prev, c)? * i64::from(weight);
            prev = c;
        }
        plain.push(char::from(num.rem_euclid(256) as u8));
        chars = tail;
        idx += 1;
    }

    Ok(plain)
}

/// Encodes `value` with the given salt and filler, picking random ones when absent.
///
/// Values that already carry the `$9$` prefix are returned unchanged.
pub fn encrypt(value: &str, salt: Option<char>, rand: Option<&str>) -> Result<String, Junos9Error> {
    if value.is_empty() || is_encrypted(value) {
        return Ok(value.to_string());
    }

    let salt: u8 = match salt {
        Some(c) if c.is_ascii() => c as u8,
        Some(c) => return Err(Junos9Error::InvalidChar(c)),
        None => random_chars(1)[0],
    };
    let needed = extra(salt)?;

    let filler: Vec<u8> = match rand {
        Some(r) if r.len() == needed => {
            for c in r.bytes() {
                position(c)?;
            }
            r.as_bytes().to_vec()
        }
        Some(r) => {
            return Err(Junos9Error::RandLength {
                salt: salt as char,
                expected: needed,
                found: r.len(),
            });
        }
        None => random_chars(needed),
    };

    let mut crypt: Vec<u8> = MAGIC.as_bytes().to_vec();
    crypt.push(salt);
    crypt.extend_from_slice(&filler);

    let mut prev = salt;
    for (idx, c) in value.chars().enumerate() {
        let code = u32::from(c);
        if code > 0xFF {
            return Err(Junos9Error::Unencodable(c));
        }
        let weights = ENCODING[idx % ENCODING.len()];
        for gap in split_gaps(code, weights) {
            let next = (gap as usize + position(prev)? + 1) % ALPHABET.len();
            prev = ALPHABET[next];
            crypt.push(prev);
        }
    }

    Ok(crypt.into_iter().map(char::from).collect())
}

fn split_gaps(mut code: u32, weights: &[u32]) -> Vec<u32> {
    let mut gaps = vec![0; weights.len()];
    for (idx, &weight) in weights.iter().enumerate().rev() {
        gaps[idx] = code / weight;
        code %= weight;
    }
    gaps
}

fn random_chars(count: usize) -> Vec<u8> {
    (0..count)
        .map(|_| ALPHABET[rand::random_range(0..ALPHABET.len())])
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
