use rusqlite::Connection;

/// Initialize the database schema.
///
/// Invariants that must hold across concurrent writers are enforced here
/// (CHECK / UNIQUE), so a racing statement fails instead of committing a
/// half-valid row.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Concerts (catalog; only what check-in needs for display)
        CREATE TABLE IF NOT EXISTS concerts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            venue TEXT NOT NULL,
            starts_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Ticket tiers (inventory counters)
        CREATE TABLE IF NOT EXISTS ticket_tiers (
            id TEXT PRIMARY KEY,
            concert_id TEXT NOT NULL REFERENCES concerts(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            price INTEGER NOT NULL CHECK (price >= 0),
            total_quantity INTEGER NOT NULL CHECK (total_quantity >= 0),
            available_quantity INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            CHECK (available_quantity >= 0 AND available_quantity <= total_quantity),
            UNIQUE(concert_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_ticket_tiers_concert ON ticket_tiers(concert_id);

        -- Orders (one purchase attempt)
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL CHECK (kind IN ('tickets', 'agent_registration')),
            status TEXT NOT NULL CHECK (status IN ('pending', 'awaiting_payment', 'paid', 'expired', 'failed', 'cancelled')),
            total_amount INTEGER NOT NULL CHECK (total_amount >= 0),
            currency TEXT NOT NULL,
            customer_user_id TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_email TEXT NOT NULL,
            customer_phone TEXT,
            payment_method TEXT,
            payment_method_detail TEXT,
            external_reference TEXT NOT NULL UNIQUE,
            payment_id TEXT,
            payment_url TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            paid_at INTEGER,
            expires_at INTEGER NOT NULL,
            CHECK ((status = 'paid') = (paid_at IS NOT NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_user_id);
        -- Sweep lookup: unresolved orders by deadline
        CREATE INDEX IF NOT EXISTS idx_orders_open_expiry ON orders(expires_at)
            WHERE status IN ('pending', 'awaiting_payment');

        -- Order line items (owned by the order)
        CREATE TABLE IF NOT EXISTS order_items (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            tier_id TEXT NOT NULL REFERENCES ticket_tiers(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            unit_price INTEGER NOT NULL CHECK (unit_price >= 0),
            subtotal INTEGER NOT NULL,
            CHECK (subtotal = quantity * unit_price)
        );
        CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);

        -- Inventory reservations (held -> released | consumed)
        CREATE TABLE IF NOT EXISTS reservations (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            tier_id TEXT NOT NULL REFERENCES ticket_tiers(id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            state TEXT NOT NULL CHECK (state IN ('held', 'released', 'consumed')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reservations_order ON reservations(order_id);

        -- Tickets (one per purchased unit)
        -- UNIQUE(order_item_id, seq) makes issuance idempotent,
        -- UNIQUE(code) catches the astronomically rare code collision.
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
            order_item_id TEXT NOT NULL REFERENCES order_items(id) ON DELETE CASCADE,
            tier_id TEXT NOT NULL REFERENCES ticket_tiers(id),
            seq INTEGER NOT NULL CHECK (seq > 0),
            code TEXT NOT NULL UNIQUE,
            redemption_state TEXT NOT NULL CHECK (redemption_state IN ('issued', 'redeemed')),
            redeemed_at INTEGER,
            redeemed_by TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(order_item_id, seq),
            CHECK ((redemption_state = 'redeemed') = (redeemed_at IS NOT NULL))
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_order ON tickets(order_id);

        -- Payment callback dedup store
        CREATE TABLE IF NOT EXISTS payment_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            order_id TEXT,
            external_reference TEXT NOT NULL,
            reported_status TEXT NOT NULL,
            outcome TEXT,
            payload TEXT NOT NULL,
            received_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_payment_events_order ON payment_events(order_id);

        -- Agents (one per user)
        CREATE TABLE IF NOT EXISTS agents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            order_id TEXT NOT NULL REFERENCES orders(id),
            activated_at INTEGER NOT NULL
        );

        -- Role grants (consumed by the identity service)
        CREATE TABLE IF NOT EXISTS role_grants (
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            granted_at INTEGER NOT NULL,
            source_order_id TEXT,
            PRIMARY KEY (user_id, role)
        );

        -- Audit trail for fulfillment and administrative overrides
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL,
            actor_id TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            details TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )
}
