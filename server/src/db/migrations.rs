use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: users, pairs, photos

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE pairs (
    id TEXT PRIMARY KEY,
    user_a_id TEXT NOT NULL UNIQUE,
    user_b_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_a_id) REFERENCES users(id),
    FOREIGN KEY (user_b_id) REFERENCES users(id),
    CHECK (user_a_id < user_b_id)
);

CREATE TABLE photos (
    id TEXT PRIMARY KEY,
    pair_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    s3_url TEXT NOT NULL,
    taken_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (pair_id) REFERENCES pairs(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_photos_pair_created ON photos(pair_id, created_at DESC);
",
    )])
}
