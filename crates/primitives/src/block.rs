use crate::{
    forks, proofs, BlockError, BlockHash, Context, Header, SealedHeader, Transaction, TxHash,
    TxOutput,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;

/// A block: header plus transaction set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block header.
    pub header: Header,
    /// The transactions, coinbase first.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Seals the block, caching the header hash.
    pub fn seal_slow(self) -> SealedBlock {
        let header = self.header.seal_slow();
        SealedBlock { header, transactions: self.transactions }
    }

    /// Encodes the height as a BIP34 coinbase script commitment.
    pub fn bip34_commitment(height: u64) -> Vec<u8> {
        let mut script = vec![0x04];
        script.extend_from_slice(&(height as u32).to_le_bytes());
        script
    }
}

/// A [`Block`] whose header is sealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedBlock {
    /// The sealed header.
    pub header: SealedHeader,
    /// The transactions, coinbase first.
    pub transactions: Vec<Transaction>,
}

impl SealedBlock {
    /// The cached block hash.
    pub const fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Recovers the unsealed block.
    pub fn unseal(self) -> Block {
        Block { header: self.header.unseal(), transactions: self.transactions }
    }

    /// Context free structural checks.
    ///
    /// Verifies the shape of the transaction set and its merkle commitment.
    /// Duplicate transaction hashes are rejected here because the duplication
    /// rule of the merkle tree would otherwise let two distinct transaction
    /// sets commit to the same root.
    pub fn check(&self) -> Result<(), BlockError> {
        if self.transactions.is_empty() {
            return Err(BlockError::Empty);
        }
        if !self.transactions[0].is_coinbase() {
            return Err(BlockError::MissingCoinbase);
        }
        if let Some(index) =
            self.transactions.iter().skip(1).position(Transaction::is_coinbase)
        {
            return Err(BlockError::ExtraCoinbase { index: index + 1 });
        }

        let mut seen = HashSet::with_capacity(self.transactions.len());
        let hashes: Vec<TxHash> = self.transactions.iter().map(Transaction::txid).collect();
        for txid in &hashes {
            if !seen.insert(*txid) {
                return Err(BlockError::DuplicateTransaction { txid: *txid });
            }
        }

        let computed = proofs::calculate_merkle_root(hashes);
        if computed != self.header.merkle_root {
            return Err(BlockError::MerkleMismatch {
                header: self.header.merkle_root,
                computed,
            });
        }
        Ok(())
    }

    /// Contextual checks requiring only the consensus [`Context`].
    pub fn check_with_context(&self, context: &Context) -> Result<(), BlockError> {
        if context.is_enabled(forks::BIP34) {
            let commitment = Block::bip34_commitment(context.height);
            let script = &self.transactions[0].inputs[0].script_sig;
            if !script.starts_with(&commitment) {
                return Err(BlockError::UncommittedHeight { height: context.height });
            }
        }
        for tx in &self.transactions {
            if !tx.is_final(context.height) {
                return Err(BlockError::NonFinalTransaction { txid: tx.txid() });
            }
        }
        Ok(())
    }

    /// Populates prevouts spendable from within this block itself.
    ///
    /// Prevouts funded by earlier blocks are the store's (or the weak branch
    /// tree's) concern and are left untouched.
    pub fn populate(&mut self) {
        let outputs: HashMap<TxHash, Vec<TxOutput>> = self
            .transactions
            .iter()
            .map(|tx| (tx.txid(), tx.outputs.clone()))
            .collect();
        for tx in self.transactions.iter_mut().skip(1) {
            for input in &mut tx.inputs {
                if input.prevout.is_some() {
                    continue;
                }
                let point = input.previous_output;
                if let Some(funded) = outputs.get(&point.txid) {
                    input.prevout = funded.get(point.index as usize).cloned();
                }
            }
        }
    }

    /// Economic acceptance: prevout presence, per transaction fee sanity and
    /// the coinbase claim against subsidy plus fees.
    pub fn accept(
        &self,
        context: &Context,
        subsidy_interval_blocks: u64,
        initial_subsidy: u64,
    ) -> Result<(), BlockError> {
        let mut fees = 0u64;
        for tx in self.transactions.iter().skip(1) {
            let mut in_value = 0u64;
            for input in &tx.inputs {
                let Some(prevout) = &input.prevout else {
                    return Err(BlockError::MissingPrevout {
                        txid: input.previous_output.txid,
                        index: input.previous_output.index,
                    });
                };
                in_value += prevout.value;
            }
            let out_value = tx.total_output_value();
            if out_value > in_value {
                return Err(BlockError::Overspend { txid: tx.txid() });
            }
            fees += in_value - out_value;
        }

        let claimed = self.transactions[0].total_output_value();
        let subsidy = block_subsidy(context.height, subsidy_interval_blocks, initial_subsidy);
        let allowed = subsidy + fees;
        if claimed > allowed {
            return Err(BlockError::ExcessCoinbaseClaim { claimed, allowed });
        }
        Ok(())
    }

    /// Script connection stand-in.
    ///
    /// Cryptographic script evaluation is out of scope; connection here
    /// re-verifies that every spend is funded by a populated prevout.
    pub fn connect(&self, _context: &Context) -> Result<(), BlockError> {
        for tx in self.transactions.iter().skip(1) {
            for input in &tx.inputs {
                if input.prevout.is_none() {
                    return Err(BlockError::MissingPrevout {
                        txid: input.previous_output.txid,
                        index: input.previous_output.index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns true if every transaction serializes to exactly 64 bytes.
    ///
    /// Such blocks sit in the merkle ambiguity class where an inner node is
    /// indistinguishable from a transaction pair, so a failed body cannot be
    /// marked unconfirmable without risking an identity collision.
    pub fn is_malleable64(&self) -> bool {
        self.transactions.iter().all(|tx| tx.serialized_size() == 64)
    }
}

impl Deref for SealedBlock {
    type Target = SealedHeader;

    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

/// Subsidy at the given height, halving every `interval` blocks.
pub fn block_subsidy(height: u64, interval: u64, initial: u64) -> u64 {
    let halvings = if interval == 0 { 0 } else { height / interval };
    if halvings >= 64 {
        return 0;
    }
    initial >> halvings
}
