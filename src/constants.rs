/// Field names of the distribution table. Sources may deliver them in
/// upper or lower case, so lookups try both.
pub const FIELD_SIGLA: &str = "TX_SIGLA";
pub const FIELD_INSUMO: &str = "TX_INSUMO";
pub const FIELD_ANO: &str = "ANO";
pub const FIELD_MES: &str = "MES";
pub const FIELD_QTDE: &str = "QTDE";

// Derived fields attached by the normalizer
pub const FIELD_SIGLA_NORM: &str = "tx_sigla_norm";
pub const FIELD_INSUMO_NORM: &str = "tx_insumo_norm";

pub const DEFAULT_DATA_TABLE: &str = "distribuicao";
pub const DEFAULT_MAPPINGS_PATH: &str = "config/mappings.json";
pub const DEFAULT_LOCAL_DATA_FILES: &[&str] = &[
    "data/normalized_vacinas_rerun2.json",
    "data/normalized_vacinas_rerun.json",
];
pub const DEFAULT_PORT: u16 = 8000;

/// Priority given to rules that do not declare one.
pub const DEFAULT_RULE_PRIORITY: i64 = 100;

/// Canonical label for every SARS-CoV-2 / COVID-19 product.
pub const COVID_LABEL: &str = "Covid-19";

// Forecast horizon used by the statistical endpoints
pub const BASE_YEAR: i32 = 2024;
pub const FORECAST_YEAR: i32 = 2025;
pub const HISTORY_YEARS: std::ops::RangeInclusive<i32> = 2020..=2024;

// Remote procedures exposed by the Supabase project
pub const RPC_COMPARACAO: &str = "obter_comparacao_dados";
pub const RPC_SOMA_POR_ANO: &str = "obter_soma_por_ano";

/// Default browser origins allowed by CORS when `CORS_ORIGINS` is not set.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "https://*.vercel.app",
    "https://vacina-data-visor.vercel.app",
    "http://localhost:8080",
    "http://127.0.0.1:8000",
    "http://localhost:3000",
];
