use super::{clamp_limit, Collect, DirectoryTools, ToolResponse};
use crate::client::{SearchRequest, SearchScope};
use crate::filter::GROUP_OBJECT_FILTER;
use crate::Result;
use dirkeeper_core::DirectoryConfig;

impl DirectoryTools {
    /// Lists group entries under the group container. Groups carry no account status.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached or the search fails.
    pub async fn list_all_groups(
        &self,
        config: &DirectoryConfig,
        limit: Option<i64>,
    ) -> Result<ToolResponse> {
        let limit = clamp_limit(limit);
        let request = SearchRequest::new(
            config.group_base_dn(),
            SearchScope::Subtree,
            GROUP_OBJECT_FILTER,
        );
        let collected = self
            .collect_once(config, Collect::new(request, limit))
            .await?;
        Ok(ToolResponse::new("group_list", limit, collected.items))
    }
}
