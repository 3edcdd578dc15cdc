/// Route table
///
/// | Path | Screen | Protected |
/// | --- | --- | --- |
/// | `/login` | sign-in | no |
/// | `/reset-password` | password update | no |
/// | `/` | redirects to `/dashboard` | - |
/// | `/dashboard` | summary | yes |
/// | `/contacts` | contact list + form | yes |
/// | `/tasks` | task list + form | yes |
/// | anything else | not found | no |

pub const LOGIN: &str = "/login";
pub const RESET_PASSWORD: &str = "/reset-password";
pub const ROOT: &str = "/";
pub const DASHBOARD: &str = "/dashboard";
pub const CONTACTS: &str = "/contacts";
pub const TASKS: &str = "/tasks";

/// A screen the location can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    ResetPassword,
    Root,
    Dashboard,
    Contacts,
    Tasks,
    NotFound,
}

impl Route {
    /// Resolves a path (query string and trailing slash ignored)
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => ROOT,
            trimmed => trimmed,
        };

        match path {
            LOGIN => Route::Login,
            RESET_PASSWORD => Route::ResetPassword,
            ROOT => Route::Root,
            DASHBOARD => Route::Dashboard,
            CONTACTS => Route::Contacts,
            TASKS => Route::Tasks,
            _ => Route::NotFound,
        }
    }

    /// Canonical path, `None` for unknown routes
    pub fn path(&self) -> Option<&'static str> {
        match self {
            Route::Login => Some(LOGIN),
            Route::ResetPassword => Some(RESET_PASSWORD),
            Route::Root => Some(ROOT),
            Route::Dashboard => Some(DASHBOARD),
            Route::Contacts => Some(CONTACTS),
            Route::Tasks => Some(TASKS),
            Route::NotFound => None,
        }
    }

    /// Screens that require a session
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Dashboard | Route::Contacts | Route::Tasks)
    }
}
