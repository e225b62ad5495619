//! Where `/signout` sends the browser.
//!
//! The chain always ends at the final return URL. In between there is at most
//! one hop through the IdP's end-session endpoint and one through the edge
//! proxy's logout, each handing over to the next via its return parameter.

use url::Url;

use ariane_core::ArianeError;

use crate::config::Config;

/// Which terminal branch the chain took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutBranch {
    /// A valid ID token lets the IdP end its own session first
    WithIdpHop,
    /// Edge logout, then the final URL
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutPlan {
    pub branch: LogoutBranch,
    /// Every URL the browser visits, in order. The first one is the redirect.
    pub hops: Vec<String>,
}

impl LogoutPlan {
    pub fn location(&self) -> &str {
        // hops always holds at least the final URL
        self.hops.first().map(String::as_str).unwrap_or("/")
    }

    pub fn final_url(&self) -> &str {
        self.hops.last().map(String::as_str).unwrap_or("/")
    }
}

/// Inputs of the chain, resolved for one request
#[derive(Debug, Clone)]
pub struct LogoutChain {
    end_session: Option<String>,
    client_id: Option<String>,
    team_domain: Option<String>,
    final_url: String,
}

impl LogoutChain {
    pub fn from_config(config: &Config, origin: &str) -> Self {
        Self {
            end_session: config.oidc.end_session_url(),
            client_id: config.oidc.client_id.clone(),
            team_domain: config.edge.team_domain.clone(),
            final_url: config
                .oidc
                .logout_return_url
                .clone()
                .unwrap_or_else(|| format!("{}/", origin.trim_end_matches('/'))),
        }
    }

    /// The edge logout hop, or the final URL when no edge team is configured.
    fn edge_hop(&self) -> Result<String, ArianeError> {
        let Some(team) = &self.team_domain else {
            return Ok(self.final_url.clone());
        };
        let mut url = parse(&format!("https://{team}/cdn-cgi/access/logout"))?;
        url.query_pairs_mut().append_pair("returnTo", &self.final_url);
        Ok(url.into())
    }

    /// Plan the chain. `id_token_hint` must already have been checked.
    pub fn plan(&self, id_token_hint: Option<&str>) -> Result<LogoutPlan, ArianeError> {
        let edge = self.edge_hop()?;
        let mut hops = Vec::with_capacity(3);

        let branch = match (id_token_hint, &self.end_session, &self.client_id) {
            (Some(hint), Some(end_session), Some(client_id)) => {
                let mut idp = parse(end_session)?;
                idp.query_pairs_mut()
                    .append_pair("client_id", client_id)
                    .append_pair("post_logout_redirect_uri", &edge)
                    .append_pair("id_token_hint", hint);
                hops.push(String::from(idp));
                LogoutBranch::WithIdpHop
            }
            _ => LogoutBranch::Direct,
        };

        if edge != self.final_url {
            hops.push(edge);
        }
        hops.push(self.final_url.clone());

        Ok(LogoutPlan { branch, hops })
    }
}

fn parse(raw: &str) -> Result<Url, ArianeError> {
    Url::parse(raw)
        .map_err(|e| ArianeError::MissingConfiguration(format!("invalid logout URL '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.oidc.issuer = Some("https://idp.example".into());
        config.oidc.client_id = Some("client".into());
        config.edge.team_domain = Some("team.cloudflareaccess.com".into());
        config
    }

    fn query(url: &str, key: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_with_idp_hop() {
        let chain = LogoutChain::from_config(&config(), "https://site.example");
        let plan = chain.plan(Some("id.token.hint")).unwrap();

        assert_eq!(plan.branch, LogoutBranch::WithIdpHop);
        assert_eq!(plan.hops.len(), 3);
        assert!(plan
            .location()
            .starts_with("https://idp.example/oidc/v1/end_session?"));
        assert_eq!(query(plan.location(), "client_id").as_deref(), Some("client"));
        assert_eq!(
            query(plan.location(), "id_token_hint").as_deref(),
            Some("id.token.hint")
        );

        let edge = query(plan.location(), "post_logout_redirect_uri").unwrap();
        assert_eq!(edge, plan.hops[1]);
        assert!(edge.starts_with("https://team.cloudflareaccess.com/cdn-cgi/access/logout?"));
        assert_eq!(query(&edge, "returnTo").as_deref(), Some("https://site.example/"));
        assert_eq!(plan.final_url(), "https://site.example/");
    }

    #[test]
    fn test_direct_without_hint() {
        let chain = LogoutChain::from_config(&config(), "https://site.example");
        let plan = chain.plan(None).unwrap();

        assert_eq!(plan.branch, LogoutBranch::Direct);
        assert_eq!(plan.hops.len(), 2);
        assert!(plan
            .location()
            .starts_with("https://team.cloudflareaccess.com/cdn-cgi/access/logout?"));
    }

    #[test]
    fn test_direct_when_idp_not_configured() {
        let mut config = config();
        config.oidc = Default::default();
        let plan = LogoutChain::from_config(&config, "https://site.example")
            .plan(Some("hint"))
            .unwrap();
        assert_eq!(plan.branch, LogoutBranch::Direct);
    }

    #[test]
    fn test_no_team_domain_goes_straight_home() {
        let mut config = config();
        config.edge.team_domain = None;

        let chain = LogoutChain::from_config(&config, "http://localhost:4321");
        let direct = chain.plan(None).unwrap();
        assert_eq!(direct.hops, vec!["http://localhost:4321/".to_string()]);

        let with_idp = chain.plan(Some("hint")).unwrap();
        assert_eq!(with_idp.hops.len(), 2);
        assert_eq!(
            query(with_idp.location(), "post_logout_redirect_uri").as_deref(),
            Some("http://localhost:4321/")
        );
    }

    #[test]
    fn test_configured_return_url() {
        let mut config = config();
        config.oidc.logout_return_url = Some("https://site.example/logged-out".into());
        let plan = LogoutChain::from_config(&config, "https://ignored.example")
            .plan(None)
            .unwrap();
        assert_eq!(plan.final_url(), "https://site.example/logged-out");
        assert_eq!(
            query(plan.location(), "returnTo").as_deref(),
            Some("https://site.example/logged-out")
        );
    }
}
