//! GF(2^8) lookup tables.
//!
//! Everything is derived from the field multiplication with the Rijndael
//! polynomial x^8 + x^4 + x^3 + x + 1: multiplicative inverses, the S-box
//! (inverse followed by the affine map), its inverse, the round constants
//! and the fixed MixColumns multiples.

use std::sync::OnceLock;

use tracing::debug;

/// Round constants needed by the largest schedule (Nk = 4, Nb = 8).
pub(crate) const RCON_LEN: usize = 30;

pub(crate) struct Tables {
    pub(crate) sbox: [u8; 256],
    pub(crate) inv_sbox: [u8; 256],
    /// `rcon[i]` is x^(i-1); `rcon[0]` is unused.
    pub(crate) rcon: [u8; RCON_LEN],
    pub(crate) mul2: [u8; 256],
    pub(crate) mul3: [u8; 256],
    pub(crate) mul9: [u8; 256],
    pub(crate) mul11: [u8; 256],
    pub(crate) mul13: [u8; 256],
    pub(crate) mul14: [u8; 256],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

/// The shared tables, built on first use.
pub(crate) fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let tables = Tables::build();
        debug_assert!(tables.verify(), "Rijndael table self-check failed");
        debug!("Rijndael tables generated");
        tables
    })
}

/// Multiplication in GF(2^8).
pub(crate) const fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut result = 0;
    while b != 0 {
        if b & 1 != 0 {
            result ^= a;
        }
        a = xtime(a);
        b >>= 1;
    }
    result
}

/// Multiplication by x.
#[inline]
pub(crate) const fn xtime(a: u8) -> u8 {
    if a & 0x80 == 0 {
        a << 1
    } else {
        (a << 1) ^ 0x1B
    }
}

fn multiples(factor: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (value, entry) in (0..=255u8).zip(table.iter_mut()) {
        *entry = gf_mul(factor, value);
    }
    table
}

fn inverses() -> [u8; 256] {
    let mut inverse = [0u8; 256];
    for a in 1..=255u8 {
        if let Some(b) = (1..=255u8).find(|&b| gf_mul(a, b) == 1) {
            inverse[usize::from(a)] = b;
        }
    }
    inverse
}

/// The S-box affine map: b ^ rotl(b,1..4) ^ 0x63.
const fn affine(b: u8) -> u8 {
    b ^ b.rotate_left(1) ^ b.rotate_left(2) ^ b.rotate_left(3) ^ b.rotate_left(4) ^ 0x63
}

impl Tables {
    fn build() -> Self {
        let inverse = inverses();

        let mut sbox = [0u8; 256];
        let mut inv_sbox = [0u8; 256];
        for x in 0..=255u8 {
            let y = affine(inverse[usize::from(x)]);
            sbox[usize::from(x)] = y;
            inv_sbox[usize::from(y)] = x;
        }

        let mut rcon = [0u8; RCON_LEN];
        let mut power = 1u8;
        for entry in rcon.iter_mut().skip(1) {
            *entry = power;
            power = xtime(power);
        }

        Self {
            sbox,
            inv_sbox,
            rcon,
            mul2: multiples(2),
            mul3: multiples(3),
            mul9: multiples(9),
            mul11: multiples(11),
            mul13: multiples(13),
            mul14: multiples(14),
        }
    }

    /// Cross-checks the generated tables against known values and each
    /// other.
    pub(crate) fn verify(&self) -> bool {
        let known = gf_mul(0x57, 0x13) == 0xFE
            && gf_mul(0xFF, 0x55) == 0xF8
            && self.sbox[0x00] == 0x63
            && self.sbox[0x53] == 0xED
            && self.inv_sbox[0x63] == 0x00
            && self.rcon[1..11] == [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80, 0x1B, 0x36];

        let bijective = (0..=255u8).all(|x| self.inv_sbox[usize::from(self.sbox[usize::from(x)])] == x);

        let multiples = (0..=255u8).all(|x| {
            let i = usize::from(x);
            self.mul2[i] == xtime(x)
                && self.mul3[i] == xtime(x) ^ x
                && self.mul9[i] == gf_mul(9, x)
                && self.mul11[i] == gf_mul(11, x)
                && self.mul13[i] == gf_mul(13, x)
                && self.mul14[i] == gf_mul(14, x)
        });

        known && bijective && multiples
    }
}
