use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Idempotent schema setup, run at every startup
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            script TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            tags TEXT[] NOT NULL DEFAULT '{}',
            max_parallel_stages INTEGER NOT NULL,
            stage_timeout_seconds BIGINT,
            env_vars JSONB NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            status VARCHAR(50) NOT NULL,
            commit_sha VARCHAR(255) NOT NULL,
            branch VARCHAR(255) NOT NULL,
            actor VARCHAR(255) NOT NULL,
            requested_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            runner_id VARCHAR(255),
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            result_success BOOLEAN,
            result_error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One finalized result per stage and run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_results (
            id SERIAL PRIMARY KEY,
            run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            stage VARCHAR(255) NOT NULL,
            status VARCHAR(50) NOT NULL,
            output TEXT NOT NULL,
            exit_code INTEGER,
            error JSONB,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ NOT NULL,
            UNIQUE (run_id, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_logs (
            id SERIAL PRIMARY KEY,
            run_id UUID NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            timestamp TIMESTAMPTZ NOT NULL,
            level VARCHAR(20) NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only; `seq` gives the history order within an environment
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            seq BIGSERIAL PRIMARY KEY,
            id UUID NOT NULL UNIQUE,
            environment VARCHAR(255) NOT NULL,
            artifact_id VARCHAR(128) NOT NULL,
            outcome VARCHAR(50) NOT NULL,
            run_id UUID,
            recorded_at TIMESTAMPTZ NOT NULL,
            record JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_pipeline_branch ON runs(pipeline_id, branch)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_logs_run_id ON run_logs(run_id, timestamp)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_environment ON deployments(environment, seq)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
