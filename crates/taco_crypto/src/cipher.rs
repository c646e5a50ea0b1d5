//! # Rijndael Cipher
//!
//! ## Design
//!
//! - The state is the block itself, column-major: byte `r + 4c` is row `r`
//!   of column `c`, so input bytes map to the state without reordering
//! - Round keys are stored flat in the same layout, one block per round
//! - `Nr = max(Nk, Nb) + 6`, where `Nk` and `Nb` count 32-bit words
//!
//! | Nb | ShiftRows offsets (rows 1, 2, 3) |
//! |----|----------------------------------|
//! | 4  | 1, 2, 3                          |
//! | 6  | 1, 2, 3                          |
//! | 8  | 1, 3, 4                          |

use crate::error::{CipherError, CipherResult};
use crate::tables::{tables, Tables};

/// Largest block, in bytes.
const MAX_BLOCK: usize = 32;

/// How consecutive blocks are chained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockMode {
    /// Every block independently.
    Ecb,
    /// Each plaintext block is XORed with the previous ciphertext block
    /// (the IV for the first).
    #[default]
    Cbc,
}

/// An expanded Rijndael key.
#[derive(Clone)]
pub struct Rijndael {
    /// Block length in 32-bit words.
    nb: usize,
    /// Key length in 32-bit words.
    nk: usize,
    rounds: usize,
    round_keys: Vec<u8>,
    iv: [u8; MAX_BLOCK],
    shifts: [usize; 4],
}

impl std::fmt::Debug for Rijndael {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rijndael")
            .field("key_bits", &(self.nk * 32))
            .field("block_bits", &(self.nb * 32))
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl Rijndael {
    /// Expands `key` (16, 24 or 32 bytes) for blocks of `block_bits`
    /// (128, 192 or 256). The CBC IV starts as all zeroes.
    ///
    /// # Errors
    ///
    /// [`CipherError::InvalidKeyLength`] or [`CipherError::InvalidBlockLength`].
    pub fn new(key: &[u8], block_bits: usize) -> CipherResult<Self> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        if !matches!(block_bits, 128 | 192 | 256) {
            return Err(CipherError::InvalidBlockLength(block_bits));
        }

        let nk = key.len() / 4;
        let nb = block_bits / 32;
        let rounds = nk.max(nb) + 6;
        let shifts = if nb == 8 { [0, 1, 3, 4] } else { [0, 1, 2, 3] };

        Ok(Self {
            nb,
            nk,
            rounds,
            round_keys: expand_key(tables(), key, nk, nb, rounds),
            iv: [0; MAX_BLOCK],
            shifts,
        })
    }

    /// Sets the CBC initialization vector.
    ///
    /// # Errors
    ///
    /// [`CipherError::InvalidIvLength`] unless `iv` is exactly one block.
    pub fn with_iv(mut self, iv: &[u8]) -> CipherResult<Self> {
        let expected = self.block_len();
        if iv.len() != expected {
            return Err(CipherError::InvalidIvLength {
                expected,
                actual: iv.len(),
            });
        }
        self.iv[..expected].copy_from_slice(iv);
        Ok(self)
    }

    /// Block length in bytes.
    #[inline]
    #[must_use]
    pub const fn block_len(&self) -> usize {
        self.nb * 4
    }

    /// Key length in bytes.
    #[inline]
    #[must_use]
    pub const fn key_len(&self) -> usize {
        self.nk * 4
    }

    /// Number of rounds.
    #[inline]
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    /// Encrypts one block in place.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`] unless `block` is exactly one block.
    pub fn encrypt_block(&self, block: &mut [u8]) -> CipherResult<()> {
        self.check_single(block)?;
        self.encrypt_state(tables(), block);
        Ok(())
    }

    /// Decrypts one block in place.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`] unless `block` is exactly one block.
    pub fn decrypt_block(&self, block: &mut [u8]) -> CipherResult<()> {
        self.check_single(block)?;
        self.decrypt_state(tables(), block);
        Ok(())
    }

    /// Encrypts whole blocks from `input` into `output`.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`] or [`CipherError::OutputTooSmall`].
    pub fn encrypt(&self, input: &[u8], output: &mut [u8], mode: BlockMode) -> CipherResult<()> {
        self.check_buffers(input, output)?;
        let tables = tables();
        let block_len = self.block_len();
        let mut chain = self.iv;

        for (plain, out) in input
            .chunks_exact(block_len)
            .zip(output.chunks_exact_mut(block_len))
        {
            out.copy_from_slice(plain);
            if mode == BlockMode::Cbc {
                xor_into(out, &chain[..block_len]);
            }
            self.encrypt_state(tables, out);
            if mode == BlockMode::Cbc {
                chain[..block_len].copy_from_slice(out);
            }
        }
        Ok(())
    }

    /// Decrypts whole blocks from `input` into `output`.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`] or [`CipherError::OutputTooSmall`].
    pub fn decrypt(&self, input: &[u8], output: &mut [u8], mode: BlockMode) -> CipherResult<()> {
        self.check_buffers(input, output)?;
        let tables = tables();
        let block_len = self.block_len();
        let mut chain = self.iv;

        for (cipher, out) in input
            .chunks_exact(block_len)
            .zip(output.chunks_exact_mut(block_len))
        {
            out.copy_from_slice(cipher);
            self.decrypt_state(tables, out);
            if mode == BlockMode::Cbc {
                xor_into(out, &chain[..block_len]);
                chain[..block_len].copy_from_slice(cipher);
            }
        }
        Ok(())
    }

    /// Encrypts into a new buffer.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`].
    pub fn encrypt_to_vec(&self, input: &[u8], mode: BlockMode) -> CipherResult<Vec<u8>> {
        let mut output = vec![0; input.len()];
        self.encrypt(input, &mut output, mode)?;
        Ok(output)
    }

    /// Decrypts into a new buffer.
    ///
    /// # Errors
    ///
    /// [`CipherError::UnalignedInput`].
    pub fn decrypt_to_vec(&self, input: &[u8], mode: BlockMode) -> CipherResult<Vec<u8>> {
        let mut output = vec![0; input.len()];
        self.decrypt(input, &mut output, mode)?;
        Ok(output)
    }

    fn check_single(&self, block: &[u8]) -> CipherResult<()> {
        if block.len() == self.block_len() {
            Ok(())
        } else {
            Err(CipherError::UnalignedInput {
                len: block.len(),
                block: self.block_len(),
            })
        }
    }

    fn check_buffers(&self, input: &[u8], output: &[u8]) -> CipherResult<()> {
        let block = self.block_len();
        if input.len() % block != 0 {
            return Err(CipherError::UnalignedInput {
                len: input.len(),
                block,
            });
        }
        if output.len() < input.len() {
            return Err(CipherError::OutputTooSmall {
                needed: input.len(),
                available: output.len(),
            });
        }
        Ok(())
    }

    fn round_key(&self, round: usize) -> &[u8] {
        let len = self.block_len();
        &self.round_keys[round * len..(round + 1) * len]
    }

    fn encrypt_state(&self, tables: &Tables, state: &mut [u8]) {
        xor_into(state, self.round_key(0));
        for round in 1..self.rounds {
            sub_bytes(state, &tables.sbox);
            self.shift_rows(state);
            mix_columns(tables, state);
            xor_into(state, self.round_key(round));
        }
        sub_bytes(state, &tables.sbox);
        self.shift_rows(state);
        xor_into(state, self.round_key(self.rounds));
    }

    fn decrypt_state(&self, tables: &Tables, state: &mut [u8]) {
        xor_into(state, self.round_key(self.rounds));
        for round in (1..self.rounds).rev() {
            self.inv_shift_rows(state);
            sub_bytes(state, &tables.inv_sbox);
            xor_into(state, self.round_key(round));
            inv_mix_columns(tables, state);
        }
        self.inv_shift_rows(state);
        sub_bytes(state, &tables.inv_sbox);
        xor_into(state, self.round_key(0));
    }

    /// Row `r` moves left by `shifts[r]` columns.
    fn shift_rows(&self, state: &mut [u8]) {
        let mut old = [0u8; MAX_BLOCK];
        old[..state.len()].copy_from_slice(state);
        for row in 1..4 {
            for column in 0..self.nb {
                let source = (column + self.shifts[row]) % self.nb;
                state[row + 4 * column] = old[row + 4 * source];
            }
        }
    }

    fn inv_shift_rows(&self, state: &mut [u8]) {
        let mut old = [0u8; MAX_BLOCK];
        old[..state.len()].copy_from_slice(state);
        for row in 1..4 {
            for column in 0..self.nb {
                let source = (column + self.nb - self.shifts[row]) % self.nb;
                state[row + 4 * column] = old[row + 4 * source];
            }
        }
    }
}

fn expand_key(tables: &Tables, key: &[u8], nk: usize, nb: usize, rounds: usize) -> Vec<u8> {
    let total_words = nb * (rounds + 1);
    let mut words = vec![[0u8; 4]; total_words];

    for (word, chunk) in words.iter_mut().zip(key.chunks_exact(4)) {
        word.copy_from_slice(chunk);
    }

    for i in nk..total_words {
        let mut temp = words[i - 1];
        if i % nk == 0 {
            temp.rotate_left(1);
            sub_bytes(&mut temp, &tables.sbox);
            temp[0] ^= tables.rcon[i / nk];
        } else if nk > 6 && i % nk == 4 {
            sub_bytes(&mut temp, &tables.sbox);
        }
        let previous = words[i - nk];
        for (byte, prev) in temp.iter_mut().zip(previous) {
            *byte ^= prev;
        }
        words[i] = temp;
    }

    words.into_iter().flatten().collect()
}

#[inline]
fn xor_into(target: &mut [u8], source: &[u8]) {
    for (byte, key) in target.iter_mut().zip(source) {
        *byte ^= key;
    }
}

#[inline]
fn sub_bytes(state: &mut [u8], sbox: &[u8; 256]) {
    for byte in state {
        *byte = sbox[usize::from(*byte)];
    }
}

fn mix_columns(tables: &Tables, state: &mut [u8]) {
    let (m2, m3) = (&tables.mul2, &tables.mul3);
    for column in state.chunks_exact_mut(4) {
        let [a0, a1, a2, a3] = [column[0], column[1], column[2], column[3]];
        let [i0, i1, i2, i3] = [a0, a1, a2, a3].map(usize::from);
        column[0] = m2[i0] ^ m3[i1] ^ a2 ^ a3;
        column[1] = a0 ^ m2[i1] ^ m3[i2] ^ a3;
        column[2] = a0 ^ a1 ^ m2[i2] ^ m3[i3];
        column[3] = m3[i0] ^ a1 ^ a2 ^ m2[i3];
    }
}

fn inv_mix_columns(tables: &Tables, state: &mut [u8]) {
    let (m9, m11, m13, m14) = (&tables.mul9, &tables.mul11, &tables.mul13, &tables.mul14);
    for column in state.chunks_exact_mut(4) {
        let [i0, i1, i2, i3] = [column[0], column[1], column[2], column[3]].map(usize::from);
        column[0] = m14[i0] ^ m11[i1] ^ m13[i2] ^ m9[i3];
        column[1] = m9[i0] ^ m14[i1] ^ m11[i2] ^ m13[i3];
        column[2] = m13[i0] ^ m9[i1] ^ m14[i2] ^ m11[i3];
        column[3] = m11[i0] ^ m13[i1] ^ m9[i2] ^ m14[i3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(text: &str) -> Vec<u8> {
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_rounds_per_size() {
        for (key_len, block_bits, rounds) in [
            (16, 128, 10),
            (24, 128, 12),
            (32, 128, 14),
            (16, 192, 12),
            (16, 256, 14),
            (24, 256, 14),
        ] {
            let cipher = Rijndael::new(&vec![0; key_len], block_bits).unwrap();
            assert_eq!(cipher.rounds(), rounds, "key {key_len} block {block_bits}");
            assert_eq!(cipher.key_len(), key_len);
        }
    }

    #[test]
    fn test_key_expansion_last_word() {
        // FIPS-197 appendix A.1: w[43] = b6630ca6
        let cipher = Rijndael::new(&hex("2b7e151628aed2a6abf7158809cf4f3c"), 128).unwrap();
        assert_eq!(&cipher.round_keys[172..176], hex("b6630ca6").as_slice());
    }

    #[test]
    fn test_key_expansion_256_last_word() {
        // FIPS-197 appendix A.3: w[59] = 706c631e
        let key = hex("603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4");
        let cipher = Rijndael::new(&key, 128).unwrap();
        assert_eq!(&cipher.round_keys[236..240], hex("706c631e").as_slice());
    }

    #[test]
    fn test_mix_columns_example() {
        // db 13 53 45 -> 8e 4d a1 bc
        let mut column = [0xdb, 0x13, 0x53, 0x45];
        mix_columns(tables(), &mut column);
        assert_eq!(column, [0x8e, 0x4d, 0xa1, 0xbc]);
        inv_mix_columns(tables(), &mut column);
        assert_eq!(column, [0xdb, 0x13, 0x53, 0x45]);
    }

    #[test]
    fn test_shift_rows_wide_block_offsets() {
        let cipher = Rijndael::new(&[0; 16], 256).unwrap();
        let mut state: Vec<u8> = (0..32).collect();
        cipher.shift_rows(&mut state);
        // Row 2 of column 0 comes from column 3, row 3 from column 4.
        assert_eq!(state[2], 2 + 4 * 3);
        assert_eq!(state[3], 3 + 4 * 4);
        cipher.inv_shift_rows(&mut state);
        assert_eq!(state, (0..32).collect::<Vec<u8>>());
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(
            Rijndael::new(&[0; 15], 128).unwrap_err(),
            CipherError::InvalidKeyLength(15)
        );
        assert_eq!(
            Rijndael::new(&[0; 16], 160).unwrap_err(),
            CipherError::InvalidBlockLength(160)
        );
        assert_eq!(
            Rijndael::new(&[0; 16], 128).unwrap().with_iv(&[0; 8]).unwrap_err(),
            CipherError::InvalidIvLength {
                expected: 16,
                actual: 8
            }
        );
    }

    #[test]
    fn test_buffer_checks() {
        let cipher = Rijndael::new(&[0; 16], 128).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(
            cipher.encrypt(&[0; 20], &mut out, BlockMode::Ecb),
            Err(CipherError::UnalignedInput { len: 20, block: 16 })
        );
        assert_eq!(
            cipher.decrypt(&[0; 48], &mut out, BlockMode::Cbc),
            Err(CipherError::OutputTooSmall {
                needed: 48,
                available: 32
            })
        );
        assert!(cipher.encrypt_block(&mut [0; 15]).is_err());
    }

    #[test]
    fn test_ecb_repeats_cbc_does_not() {
        let cipher = Rijndael::new(&[9; 32], 128).unwrap();
        let plaintext = [0x41u8; 32];

        let ecb = cipher.encrypt_to_vec(&plaintext, BlockMode::Ecb).unwrap();
        assert_eq!(ecb[..16], ecb[16..]);

        let cbc = cipher.encrypt_to_vec(&plaintext, BlockMode::Cbc).unwrap();
        assert_ne!(cbc[..16], cbc[16..]);
        // A zero IV makes the first CBC block equal to ECB.
        assert_eq!(cbc[..16], ecb[..16]);
    }
}
