use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 单次回复最大 token 数
    pub max_tokens: u32,
    /// 单次调用超时（联网搜索较慢）
    pub request_timeout: Duration,
    /// 是否在请求中开启联网搜索
    pub web_search: bool,
    /// 搜索上下文大小：low / medium / high
    pub web_search_context: String,
    /// 单次调用最多计入的搜索次数
    pub web_search_max_uses: u64,

    // --- 限流配置 ---
    /// 滑动窗口内允许的资源单位（搜索次数）上限
    pub resource_limit_per_window: u64,
    /// 滑动窗口长度
    pub rate_window: Duration,
    /// 每个条目预估消耗的资源单位
    pub estimated_units_per_item: u64,
    /// 初始并发数
    pub initial_concurrency: usize,
    /// 最大并发数
    pub max_concurrency: usize,
    /// 是否根据实际消耗动态调整并发
    pub adaptive_concurrency: bool,

    // --- 重试配置 ---
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 修复调用的传输重试次数
    pub repair_max_attempts: u32,

    // --- 路径 ---
    /// 输入文件（JSON 数组或 TOML）
    pub input_file: PathBuf,
    /// 原始结果输出目录
    pub raw_output_dir: PathBuf,
    /// 系统提示词文件
    pub system_prompt_file: PathBuf,
    /// 输出日志文件
    pub output_log_file: String,

    // --- 其他 ---
    /// 条目唯一标识字段
    pub identity_field: String,
    /// 是否先顺序处理第一个条目预热提示词缓存
    pub warm_up: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-search-preview".to_string(),
            max_tokens: 8192,
            request_timeout: Duration::from_secs(180),
            web_search: true,
            web_search_context: "medium".to_string(),
            web_search_max_uses: 5,
            resource_limit_per_window: 30,
            rate_window: Duration::from_secs(60),
            estimated_units_per_item: 7,
            initial_concurrency: 3,
            max_concurrency: 10,
            adaptive_concurrency: true,
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(120),
            repair_max_attempts: 2,
            input_file: PathBuf::from("data/input/companies.json"),
            raw_output_dir: PathBuf::from("data/raw"),
            system_prompt_file: PathBuf::from("prompts/system_prompt.txt"),
            output_log_file: "output.txt".to_string(),
            identity_field: "company_name".to_string(),
            warm_up: true,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        Ok(Self {
            llm_api_key: std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|v| !v.trim().is_empty()),
            llm_api_base_url: env_string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME", default.llm_model_name),
            max_tokens: env_parse("LLM_MAX_TOKENS", default.max_tokens)?,
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", default.request_timeout)?,
            web_search: env_parse("WEB_SEARCH", default.web_search)?,
            web_search_context: env_string("WEB_SEARCH_CONTEXT", default.web_search_context),
            web_search_max_uses: env_parse("WEB_SEARCH_MAX_USES", default.web_search_max_uses)?,
            resource_limit_per_window: env_parse(
                "RESOURCE_LIMIT_PER_WINDOW",
                default.resource_limit_per_window,
            )?,
            rate_window: env_secs("RATE_WINDOW_SECS", default.rate_window)?,
            estimated_units_per_item: env_parse(
                "ESTIMATED_UNITS_PER_ITEM",
                default.estimated_units_per_item,
            )?,
            initial_concurrency: env_parse("INITIAL_CONCURRENCY", default.initial_concurrency)?,
            max_concurrency: env_parse("MAX_CONCURRENCY", default.max_concurrency)?,
            adaptive_concurrency: env_parse("ADAPTIVE_CONCURRENCY", default.adaptive_concurrency)?,
            max_retries: env_parse("MAX_RETRIES", default.max_retries)?,
            base_delay: env_secs("BASE_DELAY_SECS", default.base_delay)?,
            max_delay: env_secs("MAX_DELAY_SECS", default.max_delay)?,
            repair_max_attempts: env_parse("REPAIR_MAX_ATTEMPTS", default.repair_max_attempts)?,
            input_file: env_path("INPUT_FILE", default.input_file),
            raw_output_dir: env_path("RAW_OUTPUT_DIR", default.raw_output_dir),
            system_prompt_file: env_path("SYSTEM_PROMPT_FILE", default.system_prompt_file),
            output_log_file: env_string("OUTPUT_LOG_FILE", default.output_log_file),
            identity_field: env_string("IDENTITY_FIELD", default.identity_field),
            warm_up: env_parse("WARM_UP", default.warm_up)?,
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging)?,
        })
    }

    /// 校验配置：凭据、文件和数值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm_api_key.is_none() {
            return Err(ConfigError::MissingApiKey {
                var_name: "LLM_API_KEY".to_string(),
            });
        }
        if self.resource_limit_per_window == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RESOURCE_LIMIT_PER_WINDOW".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.max_concurrency == 0 || self.initial_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENCY".to_string(),
                reason: "并发数必须大于 0".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_RETRIES".to_string(),
                reason: "至少需要 1 次尝试".to_string(),
            });
        }
        if self.web_search {
            if !matches!(self.web_search_context.as_str(), "low" | "medium" | "high") {
                return Err(ConfigError::InvalidValue {
                    name: "WEB_SEARCH_CONTEXT".to_string(),
                    reason: format!("应为 low / medium / high，实际为 {}", self.web_search_context),
                });
            }
            if self.web_search_max_uses == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "WEB_SEARCH_MAX_USES".to_string(),
                    reason: "开启联网搜索时必须大于 0".to_string(),
                });
            }
        }
        require_file(&self.system_prompt_file)?;
        require_file(&self.input_file)

    }

    /// 读取系统提示词
    pub fn load_system_prompt(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.system_prompt_file)
    }
}

fn require_file(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        })
    }
}

fn env_string(var_name: &str, default: String) -> String {
    std::env::var(var_name).unwrap_or(default)
}

fn env_path(var_name: &str, default: PathBuf) -> PathBuf {
    std::env::var(var_name).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(default),
    }
}

fn env_secs(var_name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: "秒数".to_string(),
            }),
        Err(_) => Ok(default),
    }
}
