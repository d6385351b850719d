//! RSA encryption of the handshake's `p_q_inner_data`.

use num_bigint::BigUint;
use strand_tl_types::Serializable;

use crate::{aes, sha1, sha256};

const PRODUCTION_N: &str = "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323";

const TEST_N: &str = "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949";

/// An RSA public key `(n, e)`.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    n: BigUint,
    e: BigUint,
}

impl PublicKey {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }

    pub fn from_components(n: BigUint, e: BigUint) -> Self {
        Self { n, e }
    }

    /// The key Telegram's production datacenters announce.
    pub fn production() -> Self {
        Self::from_decimal_modulus(PRODUCTION_N)
    }

    /// The key of Telegram's test datacenters.
    pub fn test() -> Self {
        Self::from_decimal_modulus(TEST_N)
    }

    fn from_decimal_modulus(n: &str) -> Self {
        Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10).unwrap_or_default(),
            e: BigUint::from(65537u32),
        }
    }

    pub fn modulus(&self) -> &BigUint { &self.n }

    /// Low 64 bits of SHA-1 over `rsa_public_key n:bytes e:bytes`,
    /// read as a little-endian `long`. This is what `resPQ` lists.
    pub fn fingerprint(&self) -> i64 {
        let mut buf = Vec::new();
        self.n.to_bytes_be().serialize(&mut buf);
        self.e.to_bytes_be().serialize(&mut buf);
        let sha = sha1!(&buf);
        let mut low = [0u8; 8];
        low.copy_from_slice(&sha[12..20]);
        i64::from_le_bytes(low)
    }

    /// Raw `m^e mod n`, left-padded to 256 bytes.
    fn encrypt_raw(&self, block: &[u8]) -> Vec<u8> {
        let encrypted = BigUint::from_bytes_be(block).modpow(&self.e, &self.n).to_bytes_be();
        let mut out = vec![0u8; 256usize.saturating_sub(encrypted.len())];
        out.extend(encrypted);
        out
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey(fingerprint={})", self.fingerprint())
    }
}

fn increment(data: &mut [u8]) {
    for byte in data.iter_mut().rev() {
        let (n, overflow) = byte.overflowing_add(1);
        *byte = n;
        if !overflow {
            break;
        }
    }
}

/// RSA-encrypt `data` with the `RSA_PAD` scheme (MTProto 2.0).
///
/// `random_bytes` supplies 192 - `data.len()` padding bytes followed by the
/// 32-byte temporary AES key. Returns `None` when `data` exceeds 144 bytes.
pub fn encrypt_hashed(data: &[u8], key: &PublicKey, random_bytes: &[u8; 224]) -> Option<Vec<u8>> {
    if data.len() > 144 {
        return None;
    }

    let mut data_with_padding = Vec::with_capacity(192);
    data_with_padding.extend_from_slice(data);
    data_with_padding.extend_from_slice(&random_bytes[..192 - data.len()]);

    let data_pad_reversed: Vec<u8> = data_with_padding.iter().rev().copied().collect();

    let mut temp_key = [0u8; 32];
    temp_key.copy_from_slice(&random_bytes[192..]);

    let key_aes_encrypted = loop {
        let mut data_with_hash = Vec::with_capacity(224);
        data_with_hash.extend_from_slice(&data_pad_reversed);
        data_with_hash.extend_from_slice(&sha256!(&temp_key, &data_with_padding));

        aes::ige_encrypt(&mut data_with_hash, &temp_key, &[0u8; 32]);

        let hash = sha256!(&data_with_hash);
        let mut temp_key_xor = temp_key;
        for (a, b) in temp_key_xor.iter_mut().zip(hash) {
            *a ^= b;
        }

        let mut candidate = Vec::with_capacity(256);
        candidate.extend_from_slice(&temp_key_xor);
        candidate.extend_from_slice(&data_with_hash);

        if BigUint::from_bytes_be(&candidate) < key.n {
            break candidate;
        }
        increment(&mut temp_key);
    };

    Some(key.encrypt_raw(&key_aes_encrypted))
}

/// RSA-encrypt `data` with the original scheme: `SHA1(data) + data`,
/// padded with random bytes to 255 bytes.
///
/// Returns `None` when `data` exceeds 235 bytes.
pub fn encrypt_sha1_padded(data: &[u8], key: &PublicKey, random_bytes: &[u8; 255]) -> Option<Vec<u8>> {
    if data.len() > 255 - 20 {
        return None;
    }
    let mut block = Vec::with_capacity(255);
    block.extend_from_slice(&sha1!(data));
    block.extend_from_slice(data);
    block.extend_from_slice(&random_bytes[..255 - block.len()]);
    Some(key.encrypt_raw(&block))
}
