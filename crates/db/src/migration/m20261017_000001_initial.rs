//! Initial database migration.
//!
//! Creates the wallet, settlement, ledger, idempotency, delivery queue, DLQ
//! and audit tables together with the ledger integrity triggers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: USERS & BALANCES
        // ============================================================
        db.execute_unprepared(USERS_SQL).await?;
        db.execute_unprepared(BALANCES_SQL).await?;
        db.execute_unprepared(LINKED_BANK_ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 3: LEDGER
        // ============================================================
        db.execute_unprepared(LEDGER_SQL).await?;

        // ============================================================
        // PART 4: RAMP TRANSACTIONS & TRANSFERS
        // ============================================================
        db.execute_unprepared(RAMP_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(P2P_TRANSFERS_SQL).await?;

        // ============================================================
        // PART 5: IDEMPOTENCY
        // ============================================================
        db.execute_unprepared(IDEMPOTENCY_KEYS_SQL).await?;

        // ============================================================
        // PART 6: DELIVERY QUEUE & DLQ
        // ============================================================
        db.execute_unprepared(DELIVERY_JOBS_SQL).await?;
        db.execute_unprepared(DLQ_JOBS_SQL).await?;

        // ============================================================
        // PART 7: AUDIT
        // ============================================================
        db.execute_unprepared(AUDIT_LOGS_SQL).await?;

        // ============================================================
        // PART 8: TRIGGERS & FUNCTIONS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE ramp_kind AS ENUM ('ONRAMP', 'OFFRAMP');

CREATE TYPE ramp_status AS ENUM ('Processing', 'Success', 'Failure');

CREATE TYPE ledger_direction AS ENUM ('DEBIT', 'CREDIT');

CREATE TYPE ledger_account_type AS ENUM ('USER_CASH', 'PLATFORM_CLEARING');

CREATE TYPE ledger_transaction_type AS ENUM ('ONRAMP', 'OFFRAMP', 'P2P');

CREATE TYPE delivery_job_state AS ENUM ('waiting', 'active', 'completed');

CREATE TYPE failure_class AS ENUM ('transient', 'permanent');

CREATE TYPE audit_category AS ENUM ('audit', 'security');
";

const USERS_SQL: &str = r"
CREATE TABLE users (
    id UUID PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    full_name VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const BALANCES_SQL: &str = r"
-- One wallet balance per user. BIGSERIAL ids give the global lock order.
CREATE TABLE balances (
    id BIGSERIAL PRIMARY KEY,
    user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE RESTRICT,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    amount BIGINT NOT NULL DEFAULT 0,
    locked BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_balance_amount CHECK (amount >= 0),
    CONSTRAINT chk_balance_locked CHECK (locked >= 0),
    CONSTRAINT chk_balance_locked_le_amount CHECK (locked <= amount)
);
";

const LINKED_BANK_ACCOUNTS_SQL: &str = r"
CREATE TABLE linked_bank_accounts (
    id BIGSERIAL PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    bank_name VARCHAR(100) NOT NULL,
    account_last4 VARCHAR(4) NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    amount BIGINT NOT NULL DEFAULT 0,
    locked BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_linked_amount CHECK (amount >= 0),
    CONSTRAINT chk_linked_locked CHECK (locked >= 0),
    CONSTRAINT chk_linked_locked_le_amount CHECK (locked <= amount)
);

CREATE INDEX idx_linked_bank_accounts_user ON linked_bank_accounts(user_id);
";

const LEDGER_SQL: &str = r"
CREATE TABLE ledger_accounts (
    id UUID PRIMARY KEY,
    owner_key VARCHAR(64) NOT NULL,
    account_type ledger_account_type NOT NULL,
    currency VARCHAR(3) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_ledger_account_natural_key UNIQUE (owner_key, account_type, currency)
);

CREATE TABLE ledger_transactions (
    id UUID PRIMARY KEY,
    transaction_type ledger_transaction_type NOT NULL,
    external_ref VARCHAR(255) NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY,
    transaction_id UUID NOT NULL REFERENCES ledger_transactions(id) ON DELETE RESTRICT,
    account_id UUID NOT NULL REFERENCES ledger_accounts(id) ON DELETE RESTRICT,
    direction ledger_direction NOT NULL,
    amount BIGINT NOT NULL,
    currency VARCHAR(3) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_ledger_entry_amount CHECK (amount > 0)
);

CREATE INDEX idx_ledger_entries_transaction ON ledger_entries(transaction_id);
CREATE INDEX idx_ledger_entries_account ON ledger_entries(account_id, created_at);
";

const RAMP_TRANSACTIONS_SQL: &str = r"
-- On-ramp and off-ramp transactions. The token is globally unique and is
-- the settlement idempotency key.
CREATE TABLE ramp_transactions (
    id UUID PRIMARY KEY,
    kind ramp_kind NOT NULL,
    token VARCHAR(128) NOT NULL UNIQUE,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    amount BIGINT NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    provider VARCHAR(64) NOT NULL,
    linked_bank_account_id BIGINT REFERENCES linked_bank_accounts(id) ON DELETE RESTRICT,
    status ramp_status NOT NULL DEFAULT 'Processing',
    failure_reason_code VARCHAR(64),
    failure_reason_message TEXT,
    metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
    started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    completed_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_ramp_amount CHECK (amount > 0),
    CONSTRAINT chk_ramp_failure_fields CHECK (
        status = 'Failure' OR (failure_reason_code IS NULL AND failure_reason_message IS NULL)
    ),
    CONSTRAINT chk_ramp_completed_at CHECK ((status = 'Processing') = (completed_at IS NULL)),
    CONSTRAINT chk_offramp_linked_account CHECK (kind = 'ONRAMP' OR linked_bank_account_id IS NOT NULL)
);

CREATE INDEX idx_ramp_transactions_user ON ramp_transactions(user_id, created_at DESC);
CREATE INDEX idx_ramp_transactions_processing ON ramp_transactions(created_at)
    WHERE status = 'Processing';
";

const P2P_TRANSFERS_SQL: &str = r"
CREATE TABLE p2p_transfers (
    id UUID PRIMARY KEY,
    sender_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    receiver_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
    amount BIGINT NOT NULL,
    currency VARCHAR(3) NOT NULL DEFAULT 'INR',
    ledger_transaction_id UUID NOT NULL REFERENCES ledger_transactions(id) ON DELETE RESTRICT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_p2p_amount CHECK (amount > 0),
    CONSTRAINT chk_p2p_distinct_parties CHECK (sender_id <> receiver_id)
);

CREATE INDEX idx_p2p_transfers_sender ON p2p_transfers(sender_id, created_at DESC);
CREATE INDEX idx_p2p_transfers_receiver ON p2p_transfers(receiver_id, created_at DESC);
";

const IDEMPOTENCY_KEYS_SQL: &str = r"
-- response_status NULL means the key is reserved and the request is in flight.
CREATE TABLE idempotency_keys (
    key VARCHAR(255) PRIMARY KEY,
    user_id UUID NOT NULL,
    action VARCHAR(64) NOT NULL,
    response_status SMALLINT,
    response_body JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    expires_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX idx_idempotency_keys_expires ON idempotency_keys(expires_at);
";

const DELIVERY_JOBS_SQL: &str = r"
CREATE TABLE delivery_jobs (
    id UUID PRIMARY KEY,
    job_key VARCHAR(255) NOT NULL UNIQUE,
    token VARCHAR(128) NOT NULL,
    url TEXT NOT NULL,
    secret TEXT NOT NULL,
    payload JSONB NOT NULL,
    webhook_event_id VARCHAR(255) NOT NULL,
    state delivery_job_state NOT NULL DEFAULT 'waiting',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL,
    run_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    leased_at TIMESTAMPTZ,
    last_error TEXT,
    completed_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_delivery_attempts CHECK (attempts >= 0 AND max_attempts >= 1)
);

CREATE INDEX idx_delivery_jobs_runnable ON delivery_jobs(run_at) WHERE state = 'waiting';
CREATE INDEX idx_delivery_jobs_leased ON delivery_jobs(leased_at) WHERE state = 'active';
CREATE INDEX idx_delivery_jobs_token ON delivery_jobs(token);
";

const DLQ_JOBS_SQL: &str = r"
CREATE TABLE dlq_jobs (
    id UUID PRIMARY KEY,
    source_queue VARCHAR(64) NOT NULL,
    source_job_id VARCHAR(255) NOT NULL,
    token VARCHAR(128) NOT NULL,
    url TEXT NOT NULL,
    secret TEXT NOT NULL,
    payload JSONB NOT NULL,
    webhook_event_id VARCHAR(255) NOT NULL,
    failure_reason TEXT NOT NULL,
    failure_class failure_class NOT NULL,
    failed_at TIMESTAMPTZ NOT NULL,
    attempts INTEGER NOT NULL,
    archived_at TIMESTAMPTZ,
    archived_by VARCHAR(255),
    archive_reason TEXT,
    replay_count INTEGER NOT NULL DEFAULT 0,
    replay_history JSONB NOT NULL DEFAULT '[]'::jsonb,
    last_replayed_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_dlq_jobs_failed_at ON dlq_jobs(failed_at DESC);
CREATE INDEX idx_dlq_jobs_token ON dlq_jobs(token);
CREATE INDEX idx_dlq_jobs_event ON dlq_jobs(webhook_event_id);
";

const AUDIT_LOGS_SQL: &str = r"
CREATE TABLE audit_logs (
    id UUID PRIMARY KEY,
    category audit_category NOT NULL,
    action VARCHAR(64) NOT NULL,
    actor VARCHAR(255),
    user_id UUID,
    token VARCHAR(128),
    details JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_audit_logs_token ON audit_logs(token, created_at DESC);
CREATE INDEX idx_audit_logs_category ON audit_logs(category, created_at DESC);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_ledger_mutation
-- Ledger rows are immutable once written
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_ledger_mutation()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Ledger rows are immutable (% on %)', TG_OP, TG_TABLE_NAME;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_ledger_transactions_immutable
BEFORE UPDATE OR DELETE ON ledger_transactions
FOR EACH ROW
EXECUTE FUNCTION prevent_ledger_mutation();

CREATE TRIGGER trg_ledger_entries_immutable
BEFORE UPDATE OR DELETE ON ledger_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_ledger_mutation();

-- ============================================================
-- FUNCTION: check_ledger_balance
-- At commit, every ledger transaction has >= 2 entries and
-- debits equal credits per currency
-- ============================================================
CREATE OR REPLACE FUNCTION check_ledger_balance()
RETURNS TRIGGER AS $$
DECLARE
    entry_count INTEGER;
    unbalanced_currency VARCHAR(3);
BEGIN
    SELECT COUNT(*) INTO entry_count
    FROM ledger_entries
    WHERE transaction_id = NEW.transaction_id;

    IF entry_count < 2 THEN
        RAISE EXCEPTION 'Ledger transaction % has fewer than 2 entries', NEW.transaction_id;
    END IF;

    SELECT currency INTO unbalanced_currency
    FROM ledger_entries
    WHERE transaction_id = NEW.transaction_id
    GROUP BY currency
    HAVING SUM(CASE WHEN direction = 'DEBIT' THEN amount ELSE 0 END)
        <> SUM(CASE WHEN direction = 'CREDIT' THEN amount ELSE 0 END)
    LIMIT 1;

    IF unbalanced_currency IS NOT NULL THEN
        RAISE EXCEPTION 'Ledger transaction % is unbalanced in %',
            NEW.transaction_id, unbalanced_currency;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE CONSTRAINT TRIGGER trg_check_ledger_balance
AFTER INSERT ON ledger_entries
DEFERRABLE INITIALLY DEFERRED
FOR EACH ROW
EXECUTE FUNCTION check_ledger_balance();
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS audit_logs CASCADE;
DROP TABLE IF EXISTS dlq_jobs CASCADE;
DROP TABLE IF EXISTS delivery_jobs CASCADE;
DROP TABLE IF EXISTS idempotency_keys CASCADE;
DROP TABLE IF EXISTS p2p_transfers CASCADE;
DROP TABLE IF EXISTS ramp_transactions CASCADE;
DROP TABLE IF EXISTS ledger_entries CASCADE;
DROP TABLE IF EXISTS ledger_transactions CASCADE;
DROP TABLE IF EXISTS ledger_accounts CASCADE;
DROP TABLE IF EXISTS linked_bank_accounts CASCADE;
DROP TABLE IF EXISTS balances CASCADE;
DROP TABLE IF EXISTS users CASCADE;

DROP FUNCTION IF EXISTS check_ledger_balance() CASCADE;
DROP FUNCTION IF EXISTS prevent_ledger_mutation() CASCADE;

DROP TYPE IF EXISTS audit_category;
DROP TYPE IF EXISTS failure_class;
DROP TYPE IF EXISTS delivery_job_state;
DROP TYPE IF EXISTS ledger_transaction_type;
DROP TYPE IF EXISTS ledger_account_type;
DROP TYPE IF EXISTS ledger_direction;
DROP TYPE IF EXISTS ramp_status;
DROP TYPE IF EXISTS ramp_kind;
";
