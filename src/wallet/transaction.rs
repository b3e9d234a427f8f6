//! Legacy Solana transaction encoding for system-program transfers

use crate::types::{Hash, Pubkey, Signature, HASH_BYTES, PUBKEY_BYTES, SIGNATURE_BYTES};

/// System program instruction index for `Transfer`
const SYSTEM_TRANSFER: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("unexpected end of transaction data")]
    Truncated,

    #[error("invalid compact-u16 length")]
    InvalidLength,

    #[error("trailing bytes after message")]
    TrailingBytes,

    #[error("signer {0} is not part of the message")]
    UnknownSigner(Pubkey),
}

/// Append a compact-u16 ("shortvec") length
fn encode_len(out: &mut Vec<u8>, len: usize) {
    let mut rem = len as u16;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TransactionError> {
        let end = self.pos.checked_add(n).ok_or(TransactionError::Truncated)?;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(TransactionError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8, TransactionError> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TransactionError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len(&mut self) -> Result<usize, TransactionError> {
        let mut value: usize = 0;
        for i in 0..3 {
            let byte = self.byte()?;
            value |= ((byte & 0x7f) as usize) << (7 * i);
            if byte & 0x80 == 0 {
                if value > u16::MAX as usize {
                    return Err(TransactionError::InvalidLength);
                }
                return Ok(value);
            }
        }
        Err(TransactionError::InvalidLength)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// A single system-program transfer paid for by `from`
    pub fn new_transfer(from: &Pubkey, to: &Pubkey, lamports: u64, recent_blockhash: Hash) -> Self {
        let mut data = Vec::with_capacity(12);
        data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
        data.extend_from_slice(&lamports.to_le_bytes());

        let (account_keys, accounts) = if from == to {
            (vec![*from, Pubkey::SYSTEM_PROGRAM], vec![0, 0])
        } else {
            (vec![*from, *to, Pubkey::SYSTEM_PROGRAM], vec![0, 1])
        };
        let program_id_index = (account_keys.len() - 1) as u8;

        Self {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys,
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index,
                accounts,
                data,
            }],
        }
    }

    /// The first account pays fees and signs
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    pub fn signers(&self) -> &[Pubkey] {
        let n = (self.header.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + 1 + self.account_keys.len() * PUBKEY_BYTES + 64);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        encode_len(&mut out, self.account_keys.len());
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }

        out.extend_from_slice(self.recent_blockhash.as_bytes());

        encode_len(&mut out, self.instructions.len());
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_len(&mut out, ix.accounts.len());
            out.extend_from_slice(&ix.accounts);
            encode_len(&mut out, ix.data.len());
            out.extend_from_slice(&ix.data);
        }
        out
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, TransactionError> {
        let header = MessageHeader {
            num_required_signatures: reader.byte()?,
            num_readonly_signed_accounts: reader.byte()?,
            num_readonly_unsigned_accounts: reader.byte()?,
        };

        let key_count = reader.len()?;
        let mut account_keys = Vec::with_capacity(key_count.min(64));
        for _ in 0..key_count {
            account_keys.push(Pubkey::new(reader.array::<PUBKEY_BYTES>()?));
        }

        let recent_blockhash = Hash::new(reader.array::<HASH_BYTES>()?);

        let ix_count = reader.len()?;
        let mut instructions = Vec::with_capacity(ix_count.min(16));
        for _ in 0..ix_count {
            let program_id_index = reader.byte()?;
            let n = reader.len()?;
            let accounts = reader.take(n)?.to_vec();
            let n = reader.len()?;
            let data = reader.take(n)?.to_vec();
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }
}

/// A message plus one signature slot per required signer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

impl Transaction {
    /// Wrap `message` with empty signature slots
    pub fn new_unsigned(message: Message) -> Self {
        let slots = message.header.num_required_signatures as usize;
        Self {
            signatures: vec![Signature::default(); slots],
            message,
        }
    }

    /// Bytes covered by every signature
    pub fn message_data(&self) -> Vec<u8> {
        self.message.serialize()
    }

    /// Place `signature` in the slot belonging to `signer`
    pub fn add_signature(
        &mut self,
        signer: &Pubkey,
        signature: Signature,
    ) -> Result<(), TransactionError> {
        let index = self
            .message
            .signers()
            .iter()
            .position(|k| k == signer)
            .ok_or(TransactionError::UnknownSigner(*signer))?;
        let slot = self
            .signatures
            .get_mut(index)
            .ok_or(TransactionError::UnknownSigner(*signer))?;
        *slot = signature;
        Ok(())
    }

    /// The transaction id: its first signature, once present
    pub fn signature(&self) -> Option<Signature> {
        self.signatures
            .first()
            .copied()
            .filter(|s| *s != Signature::default())
    }

    pub fn is_signed(&self) -> bool {
        !self.signatures.is_empty() && self.signatures.iter().all(|s| *s != Signature::default())
    }

    /// Wire encoding accepted by `sendTransaction`
    pub fn serialize(&self) -> Vec<u8> {
        let message = self.message.serialize();
        let mut out = Vec::with_capacity(1 + self.signatures.len() * SIGNATURE_BYTES + message.len());
        encode_len(&mut out, self.signatures.len());
        for sig in &self.signatures {
            out.extend_from_slice(sig.as_bytes());
        }
        out.extend_from_slice(&message);
        out
    }

    /// Decode a wire transaction
    pub fn from_wire(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = Reader::new(bytes);
        let sig_count = reader.len()?;
        let mut signatures = Vec::with_capacity(sig_count.min(16));
        for _ in 0..sig_count {
            signatures.push(Signature::new(reader.array::<SIGNATURE_BYTES>()?));
        }
        let message = Message::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(TransactionError::TrailingBytes);
        }
        Ok(Self {
            signatures,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Pubkey {
        Pubkey::new([b; 32])
    }

    #[test]
    fn test_encode_len() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
        ];
        for (len, expected) in cases {
            let mut out = Vec::new();
            encode_len(&mut out, *len);
            assert_eq!(&out[..], *expected, "len {}", len);
            assert_eq!(Reader::new(&out).len().unwrap(), *len);
        }
    }

    #[test]
    fn test_transfer_message_layout() {
        let blockhash = Hash::new([5u8; 32]);
        let message = Message::new_transfer(&key(1), &key(2), 1_500_000_000, blockhash);
        let bytes = message.serialize();

        // header
        assert_eq!(&bytes[..3], &[1, 0, 1]);
        // three account keys
        assert_eq!(bytes[3], 3);
        assert_eq!(&bytes[4..36], key(1).as_bytes());
        assert_eq!(&bytes[36..68], key(2).as_bytes());
        assert_eq!(&bytes[68..100], Pubkey::SYSTEM_PROGRAM.as_bytes());
        assert_eq!(&bytes[100..132], blockhash.as_bytes());
        // one instruction: program 2, accounts [0, 1], 12 bytes of data
        assert_eq!(&bytes[132..137], &[1, 2, 2, 0, 1]);
        assert_eq!(bytes[137], 12);
        assert_eq!(&bytes[138..142], &2u32.to_le_bytes());
        assert_eq!(&bytes[142..150], &1_500_000_000u64.to_le_bytes());
        assert_eq!(bytes.len(), 150);
    }

    #[test]
    fn test_self_transfer_dedups_keys() {
        let message = Message::new_transfer(&key(1), &key(1), 10, Hash::default());
        assert_eq!(message.account_keys, vec![key(1), Pubkey::SYSTEM_PROGRAM]);
        assert_eq!(message.instructions[0].program_id_index, 1);
        assert_eq!(message.instructions[0].accounts, vec![0, 0]);
    }

    #[test]
    fn test_unsigned_then_signed() {
        let message = Message::new_transfer(&key(1), &key(2), 10, Hash::default());
        let mut tx = Transaction::new_unsigned(message);
        assert!(!tx.is_signed());
        assert_eq!(tx.signature(), None);

        let sig = Signature::new([9u8; 64]);
        tx.add_signature(&key(1), sig).unwrap();
        assert!(tx.is_signed());
        assert_eq!(tx.signature(), Some(sig));

        assert_eq!(
            tx.add_signature(&key(2), sig),
            Err(TransactionError::UnknownSigner(key(2)))
        );
    }

    #[test]
    fn test_wire_decode_matches() {
        let message = Message::new_transfer(&key(1), &key(2), 42, Hash::new([3u8; 32]));
        let mut tx = Transaction::new_unsigned(message);
        tx.add_signature(&key(1), Signature::new([8u8; 64])).unwrap();

        let wire = tx.serialize();
        assert_eq!(wire[0], 1);
        assert_eq!(Transaction::from_wire(&wire).unwrap(), tx);
    }

    #[test]
    fn test_wire_decode_rejects_malformed() {
        let message = Message::new_transfer(&key(1), &key(2), 42, Hash::default());
        let wire = Transaction::new_unsigned(message).serialize();

        assert_eq!(
            Transaction::from_wire(&wire[..wire.len() - 1]),
            Err(TransactionError::Truncated)
        );

        let mut extended = wire.clone();
        extended.push(0);
        assert_eq!(
            Transaction::from_wire(&extended),
            Err(TransactionError::TrailingBytes)
        );

        assert_eq!(
            Transaction::from_wire(&[0xff, 0xff, 0xff]),
            Err(TransactionError::InvalidLength)
        );
    }
}
