//! Node-wide protocol state and the connection-handling loop.
//!
//! `known_nodes`, `blocks_in_transit`, and the mempool are process-global
//! and shared by every connection handler; each is guarded by its own
//! coarse [`parking_lot::Mutex`] rather than one lock over everything, so
//! a handler blocked on the chain store doesn't also block peer bookkeeping.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use rill_chain::{Chain, ChainError, Mempool, UtxoSet};
use rill_core::codec;
use rill_core::hash::{Hash256, PubKeyHash};
use rill_core::types::Transaction;

use crate::error::NetworkError;
use crate::protocol::{
    self, AddrPayload, BlockPayload, GetBlocksPayload, GetDataPayload, InvKind, InvPayload, Message,
    TxPayload, VersionPayload, IO_TIMEOUT, PROTOCOL_VERSION,
};

/// The mempool size threshold past which a configured miner starts mining
/// (spec step 9: "mempool.len() > 2").
const MINE_THRESHOLD: usize = 2;

/// Shared node context: one instance per process, wrapped in an `Arc` and
/// cloned into every spawned connection handler.
pub struct NodeState {
    pub node_address: String,
    pub is_bootstrap: bool,
    pub miner_address: Option<PubKeyHash>,
    pub difficulty: u32,
    pub chain: Chain,
    pub mempool: Mempool,
    known_nodes: Mutex<Vec<String>>,
    blocks_in_transit: Mutex<Vec<Hash256>>,
}

impl NodeState {
    pub fn new(
        node_address: String,
        is_bootstrap: bool,
        bootstrap_address: Option<String>,
        miner_address: Option<PubKeyHash>,
        difficulty: u32,
        chain: Chain,
    ) -> Arc<Self> {
        let known_nodes = match bootstrap_address {
            Some(addr) if addr != node_address => vec![addr],
            _ => Vec::new(),
        };
        Arc::new(Self {
            node_address,
            is_bootstrap,
            miner_address,
            difficulty,
            chain,
            mempool: Mempool::new(),
            known_nodes: Mutex::new(known_nodes),
            blocks_in_transit: Mutex::new(Vec::new()),
        })
    }

    fn utxo(&self) -> UtxoSet<'_> {
        UtxoSet::for_chain(&self.chain)
    }

    fn known_nodes_snapshot(&self) -> Vec<String> {
        self.known_nodes.lock().clone()
    }

    fn add_known_node(&self, addr: &str) {
        if addr == self.node_address {
            return;
        }
        let mut nodes = self.known_nodes.lock();
        if !nodes.iter().any(|n| n == addr) {
            nodes.push(addr.to_string());
        }
    }

    /// Bind the listener, optionally greet the bootstrap peer, and accept
    /// connections until ctrl-c fires.
    pub async fn run(self: Arc<Self>) -> Result<(), NetworkError> {
        let listener = TcpListener::bind(&self.node_address).await?;
        tracing::info!(address = %self.node_address, "listening");

        if let Some(bootstrap) = self.known_nodes_snapshot().first().cloned() {
            let version = Message::Version(VersionPayload {
                from_addr: self.node_address.clone(),
                version: PROTOCOL_VERSION,
                best_height: self.chain.get_best_height().unwrap_or(0),
            });
            self.dial_and_send(&bootstrap, version).await;
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    tracing::debug!(%peer, "accepted connection");
                    let state = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = state.handle_connection(stream).await {
                            tracing::warn!(error = %e, "connection handler failed");
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested, closing listener");
                    return Ok(());
                }
            }
        }
    }

    /// Dial `addr` and send one message. A failed dial logs and is
    /// otherwise ignored — peers are never removed from `known_nodes` on
    /// failure.
    async fn dial_and_send(&self, addr: &str, message: Message) {
        match timeout(IO_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                if let Err(e) = protocol::write_message(&mut stream, &message).await {
                    tracing::warn!(%addr, error = %e, "failed to send message");
                }
            }
            Ok(Err(e)) => tracing::warn!(%addr, error = %e, "peer unavailable"),
            Err(_) => tracing::warn!(%addr, "dial timed out"),
        }
    }

    async fn handle_connection(self: &Arc<Self>, mut stream: TcpStream) -> Result<(), NetworkError> {
        let message = protocol::read_message(&mut stream).await?;
        self.handle_message(message).await
    }

    async fn handle_message(self: &Arc<Self>, message: Message) -> Result<(), NetworkError> {
        match message {
            Message::Version(p) => self.handle_version(p).await,
            Message::Addr(p) => self.handle_addr(p),
            Message::GetBlocks(p) => self.handle_getblocks(p).await,
            Message::Inv(p) => self.handle_inv(p).await,
            Message::GetData(p) => self.handle_getdata(p).await,
            Message::Block(p) => self.handle_block(p).await,
            Message::Tx(p) => self.handle_tx(p).await,
        }
    }

    async fn handle_version(self: &Arc<Self>, p: VersionPayload) -> Result<(), NetworkError> {
        self.add_known_node(&p.from_addr);
        let local_height = self.chain.get_best_height()?;
        if local_height > p.best_height {
            let reply = Message::Version(VersionPayload {
                from_addr: self.node_address.clone(),
                version: PROTOCOL_VERSION,
                best_height: local_height,
            });
            self.dial_and_send(&p.from_addr, reply).await;
        } else if local_height < p.best_height {
            let reply = Message::GetBlocks(GetBlocksPayload {
                from_addr: self.node_address.clone(),
            });
            self.dial_and_send(&p.from_addr, reply).await;
        }
        Ok(())
    }

    fn handle_addr(self: &Arc<Self>, p: AddrPayload) -> Result<(), NetworkError> {
        for addr in &p.addr_list {
            self.add_known_node(addr);
        }
        Ok(())
    }

    async fn handle_getblocks(self: &Arc<Self>, p: GetBlocksPayload) -> Result<(), NetworkError> {
        let items = self.chain.get_block_hashes()?;
        let reply = Message::Inv(InvPayload {
            from_addr: self.node_address.clone(),
            kind: InvKind::Block,
            items,
        });
        self.dial_and_send(&p.from_addr, reply).await;
        Ok(())
    }

    async fn handle_inv(self: &Arc<Self>, p: InvPayload) -> Result<(), NetworkError> {
        match p.kind {
            InvKind::Block => {
                let Some(&first) = p.items.first() else { return Ok(()) };
                *self.blocks_in_transit.lock() = p.items[1..].to_vec();
                let reply = Message::GetData(GetDataPayload {
                    from_addr: self.node_address.clone(),
                    kind: InvKind::Block,
                    id: first,
                });
                self.dial_and_send(&p.from_addr, reply).await;
            }
            InvKind::Tx => {
                if let Some(&first) = p.items.first() {
                    if !self.mempool.contains(&first) {
                        let reply = Message::GetData(GetDataPayload {
                            from_addr: self.node_address.clone(),
                            kind: InvKind::Tx,
                            id: first,
                        });
                        self.dial_and_send(&p.from_addr, reply).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_getdata(self: &Arc<Self>, p: GetDataPayload) -> Result<(), NetworkError> {
        match p.kind {
            InvKind::Block => {
                if let Some(block) = self.chain.get_block(&p.id)? {
                    let reply = Message::Block(BlockPayload {
                        from_addr: self.node_address.clone(),
                        block_bytes: codec::encode(&block)?,
                    });
                    self.dial_and_send(&p.from_addr, reply).await;
                }
            }
            InvKind::Tx => {
                if let Some(tx) = self.mempool.get(&p.id) {
                    let reply = Message::Tx(TxPayload {
                        from_addr: self.node_address.clone(),
                        tx_bytes: codec::encode(&tx)?,
                    });
                    self.dial_and_send(&p.from_addr, reply).await;
                }
            }
        }
        Ok(())
    }

    async fn handle_block(self: &Arc<Self>, p: BlockPayload) -> Result<(), NetworkError> {
        let block: rill_core::types::Block = codec::decode(&p.block_bytes)?;
        if !block.validate_pow(self.difficulty) {
            tracing::warn!(hash = %block.hash, from = %p.from_addr, "rejecting block with invalid proof of work");
            return Ok(());
        }
        self.chain.add_block(&block)?;

        let next = {
            let mut in_transit = self.blocks_in_transit.lock();
            if in_transit.is_empty() {
                None
            } else {
                Some(in_transit.remove(0))
            }
        };
        match next {
            Some(id) => {
                let reply = Message::GetData(GetDataPayload {
                    from_addr: self.node_address.clone(),
                    kind: InvKind::Block,
                    id,
                });
                self.dial_and_send(&p.from_addr, reply).await;
            }
            None => self.utxo().reindex(&self.chain)?,
        }
        Ok(())
    }

    async fn handle_tx(self: &Arc<Self>, p: TxPayload) -> Result<(), NetworkError> {
        let tx: Transaction = codec::decode(&p.tx_bytes)?;
        let txid = tx.id;
        self.mempool.insert(tx);

        if self.is_bootstrap {
            for peer in self.known_nodes_snapshot() {
                if peer == p.from_addr {
                    continue;
                }
                let inv = Message::Inv(InvPayload {
                    from_addr: self.node_address.clone(),
                    kind: InvKind::Tx,
                    items: vec![txid],
                });
                self.dial_and_send(&peer, inv).await;
            }
        } else if self.mempool.len() > MINE_THRESHOLD && self.miner_address.is_some() {
            self.mine_tx().await?;
        }
        Ok(())
    }

    /// `true` if every input of `tx` resolves to an output still in the
    /// UTXO set and the transaction's signatures verify against it.
    fn verify_transaction(&self, tx: &Transaction) -> bool {
        let utxo = self.utxo();
        tx.verify(|ref_tx_id, ref_out_index| {
            utxo.find_output(ref_tx_id, ref_out_index)
                .ok()
                .flatten()
                .map(|out| out.pub_key_hash)
        })
    }

    /// Mine every verifiable pending transaction into new blocks, looping
    /// until the mempool is empty — an iterative rendering of the
    /// originally recursive mine-while-pool-nonempty behavior, since Rust
    /// async functions don't tail-call-optimize recursion.
    async fn mine_tx(self: &Arc<Self>) -> Result<(), ChainError> {
        let Some(miner_address) = self.miner_address else {
            return Ok(());
        };
        loop {
            let pending = self.mempool.snapshot();
            let verified: Vec<Transaction> = pending
                .into_iter()
                .filter(|tx| self.verify_transaction(tx))
                .collect();
            if verified.is_empty() {
                tracing::info!("no verifiable transactions, leaving mempool alone");
                break;
            }

            let coinbase = Transaction::new_coinbase(miner_address, vec![]);
            let mut txs = Vec::with_capacity(verified.len() + 1);
            txs.push(coinbase);
            txs.extend(verified.iter().cloned());

            let new_block = self.chain.mine_block(txs, self.difficulty)?;
            self.utxo().reindex(&self.chain)?;
            for tx in &verified {
                self.mempool.remove(&tx.id);
            }

            for peer in self.known_nodes_snapshot() {
                let inv = Message::Inv(InvPayload {
                    from_addr: self.node_address.clone(),
                    kind: InvKind::Block,
                    items: vec![new_block.hash],
                });
                self.dial_and_send(&peer, inv).await;
            }

            if self.mempool.is_empty() {
                break;
            }
        }
        Ok(())
    }
}
