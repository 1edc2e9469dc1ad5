use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashSet;

/// Octets per generated serial (RFC 5280 allows up to 20)
pub const SERIAL_LEN: usize = 16;

/// Random certificate serials, unique for the lifetime of the generator.
///
/// Serials are positive and never zero: the top bit of the first octet is
/// cleared so the DER integer needs no sign padding, and its low bit is set.
#[derive(Debug, Default)]
pub struct SerialNumberGenerator {
    issued: Mutex<HashSet<Vec<u8>>>,
}

impl SerialNumberGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_serial(&self) -> Vec<u8> {
        let mut issued = self.issued.lock();
        loop {
            let candidate = random_serial();
            if issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Record a serial that arrived from outside (e.g. an imported certificate)
    /// so generated serials never collide with it. Returns false if already known.
    pub fn reserve(&self, serial: &[u8]) -> bool {
        self.issued.lock().insert(serial.to_vec())
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

fn random_serial() -> Vec<u8> {
    let mut bytes = [0u8; SERIAL_LEN];
    OsRng.fill_bytes(&mut bytes);
    if let Some(first) = bytes.first_mut() {
        *first &= 0x7f;
        *first |= 0x01;
    }
    bytes.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_serial_shape() {
        let generator = SerialNumberGenerator::new();
        let serial = generator.next_serial();
        assert_eq!(serial.len(), SERIAL_LEN);
        assert_eq!(serial[0] & 0x80, 0);
        assert_eq!(serial[0] & 0x01, 1);
    }

    #[test]
    fn test_serials_are_unique() {
        let generator = SerialNumberGenerator::new();
        let serials: HashSet<_> = (0..1000).map(|_| generator.next_serial()).collect();
        assert_eq!(serials.len(), 1000);
        assert_eq!(generator.issued_count(), 1000);
    }

    #[test]
    fn test_reserve_blocks_reuse() {
        let generator = SerialNumberGenerator::new();
        let serial = generator.next_serial();
        assert!(!generator.reserve(&serial));
        assert!(generator.reserve(&[0x01, 0x02]));
    }

    #[test]
    fn test_concurrent_generation() {
        let generator = Arc::new(SerialNumberGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..100).map(|_| generator.next_serial()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for serial in handle.join().unwrap() {
                assert!(all.insert(serial));
            }
        }
        assert_eq!(all.len(), 800);
    }
}
