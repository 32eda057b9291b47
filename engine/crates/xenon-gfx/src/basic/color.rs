/// debug label 的颜色，用于在 RenderDoc 等工具中区分 presenter 的各个阶段
pub struct LabelColor;
impl LabelColor {
    pub const COLOR_CMD: glam::Vec4 = glam::vec4(0.0, 1.0, 0.0, 1.0);
    /// guest output 的每一个 effect pass
    pub const COLOR_EFFECT: glam::Vec4 = glam::vec4(0.0, 0.5, 1.0, 1.0);
    /// letterbox 以及整个目标的 clear
    pub const COLOR_CLEAR: glam::Vec4 = glam::vec4(0.5, 0.5, 0.5, 1.0);
    /// UI drawer
    pub const COLOR_UI: glam::Vec4 = glam::vec4(1.0, 0.0, 0.0, 1.0);
}
