//! Warp3D Nova driver family
//!
//! Per-context family: every `W3DN_CreateContext` yields a context whose
//! own function-pointer struct is patched. Nova reports failures through
//! return values or an error out parameter, so there is no error polling;
//! status-returning entry points are checked against `W3DNEC_SUCCESS`.
//! Constructors are checked for a null result and for the code written
//! through their `errCode` parameter.

use snoop_core::descriptor::{FunctionDescriptor as F, ResultCheck};
use snoop_core::{Call, ClientHandle, DrawCall, EntryPoint, FamilyDescriptor, Interceptor, Topology, WithStatus};

/// `W3DNEC_SUCCESS`
pub const W3DNEC_SUCCESS: u32 = 0;

const STATUS: ResultCheck = ResultCheck::Status { success: W3DNEC_SUCCESS };

const fn status(name: &'static str) -> F {
    F::status(name, W3DNEC_SUCCESS)
}

/// Object returned directly, error code written through `errCode`
const fn created(name: &'static str) -> F {
    F::plain(name).with_check(ResultCheck::NullOrStatus { success: W3DNEC_SUCCESS })
}

snoop_core::entry_points! {
    /// Warp3D Nova context entry points
    pub enum NovaFn in NOVA_FUNCTIONS {
        BindBitMapAsTexture => status("W3DN_BindBitMapAsTexture"),
        BindShaderDataBuffer => status("W3DN_BindShaderDataBuffer"),
        BindTexture => status("W3DN_BindTexture"),
        BindVertexAttribArray => status("W3DN_BindVertexAttribArray"),
        BufferLock => created("W3DN_BufferLock"),
        BufferUnlock => status("W3DN_BufferUnlock"),
        Clear => status("W3DN_Clear"),
        CompileShader => created("W3DN_CompileShader"),
        CreateDataBufferObject => created("W3DN_CreateDataBufferObject"),
        CreateFrameBuffer => created("W3DN_CreateFrameBuffer"),
        CreateRenderStateObject => created("W3DN_CreateRenderStateObject"),
        CreateShaderPipeline => created("W3DN_CreateShaderPipeline"),
        CreateTexSampler => created("W3DN_CreateTexSampler"),
        CreateTexture => created("W3DN_CreateTexture"),
        CreateTextureExtRMB => created("W3DN_CreateTextureExtRMB"),
        CreateVertexBufferObject => created("W3DN_CreateVertexBufferObject"),
        DBOGetAttr => F::plain("W3DN_DBOGetAttr"),
        DBOGetBuffer => status("W3DN_DBOGetBuffer"),
        DBOLock => created("W3DN_DBOLock"),
        DBOSetBuffer => status("W3DN_DBOSetBuffer"),
        DestroyContext => F::plain("W3DN_Destroy"),
        DestroyDataBufferObject => F::plain("W3DN_DestroyDataBufferObject"),
        DestroyFrameBuffer => F::plain("W3DN_DestroyFrameBuffer"),
        DestroyRenderStateObject => F::plain("W3DN_DestroyRenderStateObject"),
        DestroyShader => F::plain("W3DN_DestroyShader"),
        DestroyShaderLog => F::plain("W3DN_DestroyShaderLog"),
        DestroyShaderPipeline => F::plain("W3DN_DestroyShaderPipeline"),
        DestroyTexSampler => F::plain("W3DN_DestroyTexSampler"),
        DestroyTexture => F::plain("W3DN_DestroyTexture"),
        DestroyVertexBufferObject => F::plain("W3DN_DestroyVertexBufferObject"),
        DrawArrays => F::draw("W3DN_DrawArrays").with_check(STATUS),
        DrawElements => F::draw("W3DN_DrawElements").with_check(STATUS),
        FBBindBuffer => status("W3DN_FBBindBuffer"),
        FBGetAttr => F::plain("W3DN_FBGetAttr"),
        FBGetBufferBM => created("W3DN_FBGetBufferBM"),
        FBGetBufferTex => created("W3DN_FBGetBufferTex"),
        FBGetStatus => status("W3DN_FBGetStatus"),
        GetBlendColour => status("W3DN_GetBlendColour"),
        GetBlendEquation => status("W3DN_GetBlendEquation"),
        GetBlendMode => status("W3DN_GetBlendMode"),
        GetColourMask => F::plain("W3DN_GetColourMask"),
        GetDepthCompareFunc => F::plain("W3DN_GetDepthCompareFunc"),
        GetFace => F::plain("W3DN_GetFace"),
        GetFrontFace => F::plain("W3DN_GetFrontFace"),
        GetLineWidth => F::plain("W3DN_GetLineWidth"),
        GetPolygonMode => F::plain("W3DN_GetPolygonMode"),
        GetPolygonOffset => F::plain("W3DN_GetPolygonOffset"),
        GetProvokingVertex => F::plain("W3DN_GetProvokingVertex"),
        GetRenderTarget => F::plain("W3DN_GetRenderTarget"),
        GetScissor => F::plain("W3DN_GetScissor"),
        GetShaderDataBuffer => status("W3DN_GetShaderDataBuffer"),
        GetShaderPipeline => F::plain("W3DN_GetShaderPipeline"),
        GetState => F::plain("W3DN_GetState"),
        GetStencilFunc => status("W3DN_GetStencilFunc"),
        GetStencilOp => status("W3DN_GetStencilOp"),
        GetStencilWriteMask => status("W3DN_GetStencilWriteMask"),
        GetTexSampler => F::plain("W3DN_GetTexSampler"),
        GetTexture => F::plain("W3DN_GetTexture"),
        GetVertexAttribArray => status("W3DN_GetVertexAttribArray"),
        GetViewport => F::plain("W3DN_GetViewport"),
        Query => F::plain("W3DN_Query"),
        RSOCopy => status("W3DN_RSOCopy"),
        RSOSaveRestore => status("W3DN_RSOSaveRestore"),
        SetBlendColour => status("W3DN_SetBlendColour"),
        SetBlendEquation => status("W3DN_SetBlendEquation"),
        SetBlendMode => status("W3DN_SetBlendMode"),
        SetColourMask => status("W3DN_SetColourMask"),
        SetDepthCompareFunc => status("W3DN_SetDepthCompareFunc"),
        SetFace => status("W3DN_SetFace"),
        SetFrontFace => status("W3DN_SetFrontFace"),
        SetLineWidth => status("W3DN_SetLineWidth"),
        SetPolygonMode => status("W3DN_SetPolygonMode"),
        SetPolygonOffset => status("W3DN_SetPolygonOffset"),
        SetProvokingVertex => status("W3DN_SetProvokingVertex"),
        SetRenderTarget => status("W3DN_SetRenderTarget"),
        SetScissor => status("W3DN_SetScissor"),
        SetShaderPipeline => status("W3DN_SetShaderPipeline"),
        SetState => status("W3DN_SetState"),
        SetStencilFunc => status("W3DN_SetStencilFunc"),
        SetStencilFuncSeparate => status("W3DN_SetStencilFuncSeparate"),
        SetStencilOp => status("W3DN_SetStencilOp"),
        SetStencilOpSeparate => status("W3DN_SetStencilOpSeparate"),
        SetStencilWriteMask => status("W3DN_SetStencilWriteMask"),
        SetStencilWriteMaskSeparate => status("W3DN_SetStencilWriteMaskSeparate"),
        SetViewport => status("W3DN_SetViewport"),
        ShaderGetCount => F::plain("W3DN_ShaderGetCount"),
        ShaderGetObjectInfo => F::plain("W3DN_ShaderGetObjectInfo"),
        ShaderGetTotalStorage => F::plain("W3DN_ShaderGetTotalStorage"),
        ShaderGetType => F::plain("W3DN_ShaderGetType"),
        Submit => F::frame("W3DN_Submit").with_check(STATUS),
        TexGenMipMaps => status("W3DN_TexGenMipMaps"),
        TexGetParameters => F::plain("W3DN_TexGetParameters"),
        TexGetProperty => F::plain("W3DN_TexGetProperty"),
        TexGetRMBuffer => F::null_check("W3DN_TexGetRMBuffer"),
        TexGetSubResourceInfo => F::plain("W3DN_TexGetSubResourceInfo"),
        TexSetParameters => F::plain("W3DN_TexSetParameters"),
        TexSetProperty => status("W3DN_TexSetProperty"),
        TexUpdateImage => status("W3DN_TexUpdateImage"),
        TexUpdateSubImage => status("W3DN_TexUpdateSubImage"),
        TSGetParameters => F::plain("W3DN_TSGetParameters"),
        TSSetParameters => F::plain("W3DN_TSSetParameters"),
        VBOGetArray => status("W3DN_VBOGetArray"),
        VBOGetAttr => F::plain("W3DN_VBOGetAttr"),
        VBOLock => created("W3DN_VBOLock"),
        VBOSetArray => status("W3DN_VBOSetArray"),
        WaitDone => status("W3DN_WaitDone"),
        WaitIdle => status("W3DN_WaitIdle"),
    }
}

/// The Warp3D Nova family
pub static NOVA: FamilyDescriptor = FamilyDescriptor {
    name: "Warp3DNova",
    functions: NOVA_FUNCTIONS,
    error_poll: None,
    success_code: W3DNEC_SUCCESS,
};

/// Topology of a `W3DN_Primitive`
pub fn topology(primitive: u32) -> Option<Topology> {
    match primitive {
        0 => Some(Topology::Triangles),
        1 => Some(Topology::TriangleStrip),
        2 => Some(Topology::TriangleFan),
        3 => Some(Topology::Lines),
        4 => Some(Topology::LineStrip),
        5 => Some(Topology::LineLoop),
        6 => Some(Topology::Points),
        _ => None,
    }
}

/// Mnemonic of a `W3DN_Primitive`
pub fn primitive_name(primitive: u32) -> &'static str {
    match primitive {
        0 => "W3DN_PRIM_TRIANGLES",
        1 => "W3DN_PRIM_TRISTRIP",
        2 => "W3DN_PRIM_TRIFAN",
        3 => "W3DN_PRIM_LINES",
        4 => "W3DN_PRIM_LINESTRIP",
        5 => "W3DN_PRIM_LINELOOP",
        6 => "W3DN_PRIM_POINTS",
        _ => "?",
    }
}

fn draw_call(primitive: u32, count: u32) -> Option<DrawCall> {
    topology(primitive).map(|t| DrawCall::new(t, u64::from(count)))
}

/// Intercept `DrawArrays(renderState, primitive, base, count)`
pub fn draw_arrays(
    interceptor: &Interceptor,
    context: ClientHandle,
    primitive: u32,
    base: u32,
    count: u32,
    forward: impl FnOnce(EntryPoint) -> u32,
) -> u32 {
    interceptor.invoke(
        Call::new(context, NovaFn::DrawArrays)
            .args(&format_args!("{}, {}, {}", primitive_name(primitive), base, count))
            .draw(draw_call(primitive, count)),
        forward,
    )
}

/// Intercept `DrawElements(renderState, primitive, baseVertex, count, indexBuffer, bufIdx)`
pub fn draw_elements(
    interceptor: &Interceptor,
    context: ClientHandle,
    primitive: u32,
    base_vertex: u32,
    count: u32,
    index_buffer: usize,
    forward: impl FnOnce(EntryPoint) -> u32,
) -> u32 {
    interceptor.invoke(
        Call::new(context, NovaFn::DrawElements)
            .args(&format_args!(
                "{}, {}, {}, {:#x}",
                primitive_name(primitive),
                base_vertex,
                count,
                index_buffer
            ))
            .draw(draw_call(primitive, count)),
        forward,
    )
}

/// Intercept `Submit(errCode)`; returns the submit id and the error code
pub fn submit(
    interceptor: &Interceptor,
    context: ClientHandle,
    forward: impl FnOnce(EntryPoint) -> WithStatus<u32>,
) -> WithStatus<u32> {
    interceptor.invoke(Call::new(context, NovaFn::Submit), forward)
}
