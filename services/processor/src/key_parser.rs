use crate::error::PipelineError;

/// Identity of one upload, derived from its object key
///
/// Key format: `<group-id>.<sequence-token>.<extension>`, split from the right,
/// so the group-id may itself contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub group_id: String,
    pub sequence_token: String,
    pub extension: String,
}

impl JobKey {
    /// Parse an object key. Only the final `/`-separated segment is considered.
    pub fn parse(object_key: &str) -> Result<Self, PipelineError> {
        let file_name = object_key.rsplit('/').next().unwrap_or(object_key);

        let mut parts = file_name.rsplitn(3, '.');
        let extension = parts.next();
        let sequence_token = parts.next();
        let group_id = parts.next();

        match (group_id, sequence_token, extension) {
            (Some(group_id), Some(sequence_token), Some(extension))
                if !group_id.is_empty() && !sequence_token.is_empty() =>
            {
                Ok(Self {
                    group_id: group_id.to_string(),
                    sequence_token: sequence_token.to_string(),
                    extension: extension.to_string(),
                })
            }
            _ => Err(PipelineError::MalformedKey {
                key: object_key.to_string(),
            }),
        }
    }

    /// Local file name for the downloaded source video
    pub fn local_video_name(&self) -> String {
        if self.extension.is_empty() {
            format!("{}_{}", self.group_id, self.sequence_token)
        } else {
            format!("{}_{}.{}", self.group_id, self.sequence_token, self.extension)
        }
    }

    /// Local directory name for extracted frames
    pub fn frames_dir_name(&self) -> String {
        format!("frames_{}_{}", self.group_id, self.sequence_token)
    }

    /// Local file name for the packaged archive
    pub fn archive_name(&self) -> String {
        format!("{}_{}.zip", self.group_id, self.sequence_token)
    }

    /// Destination object key: `<group-id>/<sequence-token>.zip`
    pub fn destination_key(&self) -> String {
        format!("{}/{}.zip", self.group_id, self.sequence_token)
    }
}
