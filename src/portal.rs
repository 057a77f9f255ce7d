use crate::error::PortalError;
use crate::projection::{AttendanceReport, AttendanceSource};
use crate::scrape::*;

use log::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use reqwest::header::*;
use reqwest::Client;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

const LOGIN_PATH: &str = "/student_login.php";
const CAPTCHA_PATH: &str = "/captcha/image.php";
const DASHBOARD_PATH: &str = "/student/dash_board.php";
const SUBJECT_ATTENDANCE_PATH: &str = "/student/attendance_subwise.php";

const USER_AGENT_STR: &str = "skipcount";

pub const DASHBOARD_FILE: &str = "dashboard.html";
pub const FAILED_LOGIN_FILE: &str = "debug_failed.html";

pub struct Credentials {
    pub user_id: String,
    pub password: String,
    pub captcha: String,
}

/// One logged in session with the student portal.
///
/// The cookie store lives inside the client, so everything fetched through
/// the same `PortalClient` shares the login.
pub struct PortalClient {
    client: Client,
    base_url: String,
    debug_dir: PathBuf,
    request_jitter_ms: u64,
    rng: Mutex<SmallRng>,
}

impl PortalClient {
    pub fn new(base_url: &str, debug_dir: &Path) -> Result<Self, PortalError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_STR)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            debug_dir: debug_dir.to_path_buf(),
            request_jitter_ms: 0,
            rng: Mutex::new(SmallRng::from_entropy()),
        })
    }

    /// Random pause of up to `ms` before each subject request
    pub fn with_request_jitter(mut self, ms: u64) -> Self {
        self.request_jitter_ms = ms;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn save_page(&self, file_name: &str, html: &str) -> Result<PathBuf, PortalError> {
        let path = self.debug_dir.join(file_name);

        fs::create_dir_all(&self.debug_dir)
            .and_then(|_| fs::write(&path, html))
            .map_err(|source| PortalError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }

    /// Opens the login page (which starts the session) and saves the captcha
    /// image that goes with it.
    pub async fn fetch_captcha(&self, dest: &Path) -> Result<(), PortalError> {
        info!("Fetching login page...");
        self.client.get(self.url(LOGIN_PATH)).send().await?;

        let image = self
            .client
            .get(self.url(CAPTCHA_PATH))
            .send()
            .await?
            .bytes()
            .await?;

        fs::write(dest, &image).map_err(|source| PortalError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Signs in and returns the dashboard HTML.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, PortalError> {
        let login_url = self.url(LOGIN_PATH);

        let payload = [
            ("user_id", credentials.user_id.as_str()),
            ("user_password", credentials.password.as_str()),
            ("token", credentials.captcha.as_str()),
            ("submit", "Sign in"),
        ];

        self.client
            .post(&login_url)
            .header(REFERER, login_url.as_str())
            .form(&payload)
            .send()
            .await?;

        let dashboard = self
            .client
            .get(self.url(DASHBOARD_PATH))
            .send()
            .await?
            .text()
            .await?;

        if !login_succeeded(&dashboard) {
            let debug_page = self.save_page(FAILED_LOGIN_FILE, &dashboard)?;
            error!("Login failed. Saved {}", debug_page.display());
            return Err(PortalError::LoginFailed { debug_page });
        }

        info!("Login successful!");

        let saved = self.save_page(DASHBOARD_FILE, &dashboard)?;
        debug!("Saved dashboard to {}", saved.display());

        Ok(dashboard)
    }

    pub async fn fetch_subject_page(&self, subject_code: &str) -> Result<String, PortalError> {
        let page = self
            .client
            .get(self.url(SUBJECT_ATTENDANCE_PATH))
            .query(&[("course_code", subject_code), ("submit", "Submit")])
            .send()
            .await?
            .text()
            .await?;

        Ok(page)
    }

    async fn pause(&self) {
        if self.request_jitter_ms == 0 {
            return;
        }

        let jitter = match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..=self.request_jitter_ms),
            Err(_) => self.request_jitter_ms,
        };

        tokio::time::sleep(Duration::from_millis(jitter)).await;
    }
}

impl AttendanceSource for PortalClient {
    async fn fetch_attendance(&self, subject_code: &str) -> Result<AttendanceReport, PortalError> {
        self.pause().await;

        info!("Fetching attendance for {}...", subject_code);
        let page = self.fetch_subject_page(subject_code).await?;

        Ok(parse_subject_attendance(&page))
    }
}

/// Asks for one line on stdin
pub fn prompt(label: &str) -> Result<String, PortalError> {
    print!("{}: ", label);
    io::stdout().flush().map_err(PortalError::Prompt)?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(PortalError::Prompt)?;

    Ok(line.trim().to_string())
}

/// Prompts for whatever the user didn't pass on the command line.
pub fn read_credentials(user_id: Option<String>) -> Result<Credentials, PortalError> {
    let user_id = match user_id {
        Some(user_id) => user_id,
        None => prompt("Enrollment Number")?,
    };

    Ok(Credentials {
        user_id,
        password: prompt("Password")?,
        captcha: prompt("Captcha text")?,
    })
}
