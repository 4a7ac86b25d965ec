use rlp::RlpStream;
use std::time::Duration;
use tempfile::tempdir;
use zar_core::config::{DEVELOPER_ADDRESS, MAX_CREDIT_AMOUNT};
use zar_core::consensus::RewardRecipients;
use zar_core::decoder::RawTransactionDecoder;
use zar_core::{Amount, Blockchain, ChainStore, DecodeError, FileStore, Ledger, MemoryStore, Mempool};
use zar_node::{NodeError, NodeHandle, TxStatus};

const MINER: &str = "0x000000000000000000000000000000000000000a";
const STAKER: &str = "0x000000000000000000000000000000000000000b";
const TREASURY: &str = "0x000000000000000000000000000000000000000c";
const RECEIVER: &str = "0x3f1a7c22900b5e6148d2039abc4471ee10586daf";
const ONE_ZAR_WEI: u128 = 1_000_000_000_000_000_000;

fn recipients() -> RewardRecipients {
    RewardRecipients::new(MINER, STAKER, TREASURY)
}

fn start_node(difficulty: u32) -> (NodeHandle, tokio::task::JoinHandle<()>) {
    let chain = Blockchain::new(difficulty).unwrap();
    zar_node::start(chain, Box::new(MemoryStore::new(1)), recipients())
}

fn trimmed(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

/// Legacy 9-field transfer signed (for placeholder purposes) with `sig_byte` r/s.
fn raw_transfer(to: &str, value: u128, nonce: u64, sig_byte: u8) -> String {
    let to = hex::decode(to.trim_start_matches("0x")).unwrap();
    let value = trimmed(value);
    let mut s = RlpStream::new_list(9);
    s.append(&nonce);
    s.append(&1_000_000_000u64);
    s.append(&21_000u64);
    s.append(&&to[..]);
    s.append(&&value[..]);
    s.append_empty_data();
    s.append(&27u64);
    s.append(&&[sig_byte; 32][..]);
    s.append(&&[sig_byte.wrapping_add(1); 32][..]);
    format!("0x{}", hex::encode(s.out()))
}

fn sender_of(raw: &str) -> String {
    RawTransactionDecoder::new().decode_hex(raw).unwrap().sender
}

#[tokio::test]
async fn mining_cycle_drains_mempool_into_one_block() {
    let (node, _engine) = start_node(1);
    node.credit_external("SYSTEM", RECEIVER, Amount::from_zar(1)).await.unwrap();
    node.credit_external("FAUCET", MINER, Amount::from_zar(2)).await.unwrap();
    assert_eq!(node.get_mempool_size().await.unwrap(), 2);

    let outcome = node.trigger_mining_cycle(&recipients()).await.unwrap();
    assert_eq!(outcome.index, 1);
    assert_eq!(node.get_mempool_size().await.unwrap(), 0);

    let block = node.get_block(1).await.unwrap();
    assert_eq!(block.transactions.len(), 6);
    let ids: Vec<&str> = block.transactions.iter().map(|t| t.id()).collect();
    assert!(ids[0].starts_with("credit-system-"));
    assert!(ids[1].starts_with("credit-faucet-"));
    assert_eq!(
        &ids[2..],
        &["miner-reward-1", "staker-reward-1", "treasury-reward-1", "dev-fee-1"]
    );
    assert_eq!(node.get_height().await.unwrap(), 1);
    assert_eq!(node.get_latest_block_hash().await.unwrap(), block.hash);
    assert_eq!(block.previous_hash, node.get_block(0).await.unwrap().hash);
}

#[tokio::test]
async fn transfer_routes_fee_and_reports_status() {
    let (node, _engine) = start_node(1);
    let raw = raw_transfer(RECEIVER, ONE_ZAR_WEI, 0, 0x11);
    let sender = sender_of(&raw);

    node.credit_external("FAUCET", &sender, Amount::from_zar(3)).await.unwrap();
    node.trigger_mining_cycle(&recipients()).await.unwrap();
    let dev_before = node.get_balance(DEVELOPER_ADDRESS).await.unwrap();

    let reference = node.submit_transfer(&raw).await.unwrap();
    assert!(reference.starts_with("0x"));
    assert_eq!(
        node.get_transaction_status(&reference).await.unwrap(),
        TxStatus {
            included: false,
            block_height: None
        }
    );
    assert_eq!(node.get_transaction_count(&sender).await.unwrap(), 1);

    let outcome = node.trigger_mining_cycle(&recipients()).await.unwrap();
    assert_eq!(
        node.get_transaction_status(&reference).await.unwrap(),
        TxStatus {
            included: true,
            block_height: Some(outcome.index)
        }
    );

    assert_eq!(node.get_balance(RECEIVER).await.unwrap().to_string(), "0.9999");
    assert_eq!(node.get_balance(&sender).await.unwrap(), Amount::from_zar(2));
    // transfer fee plus this block's developer reward share
    let dev_gain = node.get_balance(DEVELOPER_ADDRESS).await.unwrap() - dev_before;
    assert_eq!(dev_gain.to_string(), "0.0011");
}

#[tokio::test]
async fn insufficient_balance_leaves_mempool_untouched() {
    let (node, _engine) = start_node(1);
    let raw = raw_transfer(RECEIVER, 5 * ONE_ZAR_WEI, 0, 0x21);

    let err = node.submit_transfer(&raw).await.unwrap_err();
    match err {
        NodeError::InsufficientBalance { have, need } => {
            assert_eq!(have, Amount::ZERO);
            assert_eq!(need, Amount::from_zar(5));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(node.get_mempool_size().await.unwrap(), 0);
    assert_eq!(node.get_transaction_count(&sender_of(&raw)).await.unwrap(), 0);
}

#[tokio::test]
async fn decode_errors_reach_the_caller() {
    let (node, _engine) = start_node(1);
    let err = node.submit_transfer("0x1234").await.unwrap_err();
    assert!(matches!(err, NodeError::Decode(DecodeError::MalformedEncoding(_))));

    let zero = raw_transfer(RECEIVER, 0, 0, 0x31);
    let err = node.submit_transfer(&zero).await.unwrap_err();
    assert!(matches!(err, NodeError::Decode(DecodeError::NonPositiveValue)));
    assert_eq!(node.get_mempool_size().await.unwrap(), 0);
}

#[tokio::test]
async fn resubmitting_a_transfer_is_not_queued_twice() {
    let (node, _engine) = start_node(1);
    let raw = raw_transfer(RECEIVER, ONE_ZAR_WEI, 0, 0x41);
    node.credit_external("SYSTEM", &sender_of(&raw), Amount::from_zar(5)).await.unwrap();
    node.trigger_mining_cycle(&recipients()).await.unwrap();

    let first = node.submit_transfer(&raw).await.unwrap();
    let second = node.submit_transfer(&raw).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(node.get_mempool_size().await.unwrap(), 1);
}

#[tokio::test]
async fn faucet_credits_net_amount() {
    let (node, _engine) = start_node(1);
    let address = "0x5555555555555555555555555555555555555555";
    let credited = node.request_faucet(address).await.unwrap();
    assert_eq!(credited.to_string(), "9.999");
    assert_eq!(node.get_balance(address).await.unwrap().to_string(), "9.999");
    assert_eq!(node.get_height().await.unwrap(), 1);

    let err = node.request_faucet("not-an-address").await.unwrap_err();
    assert!(matches!(err, NodeError::InvalidAddress(_)));
}

#[tokio::test]
async fn credit_external_validates_input() {
    let (node, _engine) = start_node(1);
    let err = node
        .credit_external("BRIDGE", RECEIVER, Amount::from_zar(1))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::UnknownSentinel(_)));

    let err = node
        .credit_external("SYSTEM", RECEIVER, Amount::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::NonPositiveCredit));

    let err = node
        .credit_external("SYSTEM", RECEIVER, Amount::from_base_units(i128::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::CreditTooLarge { max, .. } if max == MAX_CREDIT_AMOUNT));
    assert_eq!(node.get_mempool_size().await.unwrap(), 0);
}

#[tokio::test]
async fn largest_credits_still_mine() {
    let (node, _engine) = start_node(1);
    node.credit_external("SYSTEM", RECEIVER, MAX_CREDIT_AMOUNT).await.unwrap();
    node.credit_external("SYSTEM", RECEIVER, MAX_CREDIT_AMOUNT).await.unwrap();
    node.trigger_mining_cycle(&recipients()).await.unwrap();

    assert_eq!(
        node.get_balance(RECEIVER).await.unwrap(),
        Amount::from_zar(2_000_000_000)
    );
    assert_eq!(node.get_height().await.unwrap(), 1);
}

#[tokio::test]
async fn rewards_to_checksummed_miner_are_readable() {
    let (node, _engine) = start_node(1);
    let miner = "0xABCDEF0000000000000000000000000000000001";
    let recipients = RewardRecipients::new(miner, STAKER, TREASURY);
    node.trigger_mining_cycle(&recipients).await.unwrap();

    assert_eq!(node.get_balance(miner).await.unwrap().to_string(), "5.9994");
    let block = node.get_block(1).await.unwrap();
    assert_eq!(block.transactions[0].receiver(), miner.to_lowercase());
}

#[tokio::test]
async fn unknown_lookups_are_not_found() {
    let (node, _engine) = start_node(1);
    assert!(matches!(node.get_block(7).await, Err(NodeError::NotFound(_))));
    assert!(matches!(
        node.get_transaction_status("0xdeadbeef").await,
        Err(NodeError::NotFound(_))
    ));
    assert_eq!(node.get_balance("0xnobody").await.unwrap(), Amount::ZERO);
}

#[tokio::test]
async fn stopping_mid_seal_requeues_transactions() {
    // genesis at difficulty 1, but every new block needs an unreachable 64 nibbles
    let genesis = Blockchain::new(1).unwrap();
    let chain = Blockchain::from_parts(genesis.blocks().to_vec(), 64, Mempool::new(), Ledger::new()).unwrap();
    let (node, _engine) = zar_node::start(chain, Box::new(MemoryStore::new(1)), recipients());
    node.credit_external("SYSTEM", RECEIVER, Amount::from_zar(1)).await.unwrap();

    let miner = node.clone();
    let cycle = tokio::spawn(async move { miner.trigger_mining_cycle(&recipients()).await });

    // wait until the candidate has drained the mempool
    for _ in 0..200 {
        if node.get_mempool_size().await.unwrap() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    node.stop_mining();

    let result = cycle.await.unwrap();
    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(node.get_mempool_size().await.unwrap(), 1);
    assert_eq!(node.get_height().await.unwrap(), 0);
    assert!(!node.mining_status().active);
}

#[tokio::test]
async fn abandoned_trigger_does_not_lose_transactions() {
    let genesis = Blockchain::new(1).unwrap();
    let chain = Blockchain::from_parts(genesis.blocks().to_vec(), 64, Mempool::new(), Ledger::new()).unwrap();
    let (node, _engine) = zar_node::start(chain, Box::new(MemoryStore::new(1)), recipients());
    node.credit_external("SYSTEM", RECEIVER, Amount::from_zar(1)).await.unwrap();

    let waited = tokio::time::timeout(
        Duration::from_millis(200),
        node.trigger_mining_cycle(&recipients()),
    )
    .await;
    assert!(waited.is_err());

    // the cycle keeps sealing on its own; stopping it hands the credit back
    node.stop_mining();
    let mut size = 0;
    for _ in 0..400 {
        size = node.get_mempool_size().await.unwrap();
        if size == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(size, 1);
    assert_eq!(node.get_height().await.unwrap(), 0);
}

#[tokio::test]
async fn periodic_miner_produces_blocks_until_stopped() {
    let (node, _engine) = start_node(1);
    let miner = zar_node::spawn_miner(node.clone(), Duration::from_millis(20));

    for _ in 0..500 {
        if node.get_height().await.unwrap() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    node.stop_mining();
    miner.await.unwrap();

    assert!(node.get_height().await.unwrap() >= 2);
    assert!(node.mining_status().blocks_mined >= 2);
    assert!(node.get_balance(MINER).await.unwrap().is_positive());
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempdir().unwrap();
    let address = "0x6666666666666666666666666666666666666666";

    {
        let mut store = FileStore::open(dir.path(), 1).unwrap();
        let chain = store.load(1).unwrap();
        let (node, engine) = zar_node::start(chain, Box::new(store), recipients());
        node.request_faucet(address).await.unwrap();
        node.credit_external("SYSTEM", RECEIVER, Amount::from_zar(4)).await.unwrap();
        node.shutdown().await.unwrap();
        engine.await.unwrap();
        assert!(matches!(node.get_height().await, Err(NodeError::EngineStopped)));
    }

    let mut store = FileStore::open(dir.path(), 1).unwrap();
    let chain = store.load(1).unwrap();
    assert_eq!(chain.height(), 1);
    assert_eq!(chain.balance(address).to_string(), "9.999");
    // the pending credit was in the final snapshot
    assert_eq!(chain.mempool().len(), 1);
}
